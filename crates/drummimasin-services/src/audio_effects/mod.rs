//! Mono-bus effects: per-track gain and delay, master reverb and dynamics

mod native;

pub use native::{
    CompressorEffect, DelayEffect, GainEffect, ImpulseResponse, LimiterEffect, ReverbEffect,
};

use std::fmt::Debug;
use std::ops::RangeInclusive;

/// In-place block processor addressed by name from the effects graph
pub trait AudioEffect: Send + Debug {
    fn name(&self) -> &'static str;
    fn process(&mut self, block: &mut [f32]);
    /// Unknown names are ignored
    fn set_param(&mut self, name: &str, value: f32);
    fn params(&self) -> Vec<EffectParam>;

    fn param(&self, name: &str) -> Option<f32> {
        self.params().into_iter().find(|p| p.name == name).map(|p| p.value)
    }
}

/// Current value of one effect control and its legal range
#[derive(Debug, Clone, PartialEq)]
pub struct EffectParam {
    pub name: &'static str,
    pub value: f32,
    pub range: RangeInclusive<f32>,
    pub unit: &'static str,
}

impl EffectParam {
    pub fn new(name: &'static str, value: f32, range: RangeInclusive<f32>, unit: &'static str) -> Self {
        Self { name, value, range, unit }
    }
}

/// Effects run front to back over the same block
#[derive(Debug, Default)]
pub struct EffectChain {
    slots: Vec<Box<dyn AudioEffect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `push`
    pub fn with(mut self, effect: impl AudioEffect + 'static) -> Self {
        self.push(Box::new(effect));
        self
    }

    pub fn push(&mut self, effect: Box<dyn AudioEffect>) {
        self.slots.push(effect);
    }

    pub fn process(&mut self, block: &mut [f32]) {
        self.slots.iter_mut().for_each(|effect| effect.process(block));
    }

    pub fn find(&self, name: &str) -> Option<&dyn AudioEffect> {
        self.slots.iter().map(|e| &**e).find(|e| e.name() == name)
    }

    /// Returns false when no effect in the chain is called `effect`
    pub fn set_param(&mut self, effect: &str, param: &str, value: f32) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|e| e.name() == effect) else {
            return false;
        };
        slot.set_param(param, value);
        true
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
