//! Step sequencer: pattern editing and per-tick trigger dispatch

use std::collections::BTreeSet;

use crate::error::Result;
use crate::pattern::{Pattern, StepCount};
use crate::random::RandomSource;
use crate::track::TrackId;
use crate::transport::StepTick;

/// Probability of a step being on after a randomize
pub const RANDOMIZE_DENSITY: f64 = 0.30;
/// Remix amount is scaled by this before rolling for an extra hit
pub const REMIX_SCALE: f64 = 0.4;
pub const DEFAULT_VELOCITY: f32 = 1.0;

/// Receives triggers for a track at an audio-clock time
pub trait TriggerSink {
    fn trigger(&mut self, track: TrackId, time: f64, velocity: f32);
}

/// Notified of playhead and pattern changes
pub trait SequencerObserver: Send {
    fn step_changed(&mut self, _step: usize, _time: f64, _generation: u64) {}
    fn pattern_changed(&mut self, _track: TrackId) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl SequencerObserver for NullObserver {}

pub struct StepSequencer {
    pattern: Pattern,
    muted: BTreeSet<TrackId>,
    soloed: BTreeSet<TrackId>,
    remix_amount: f64,
    rng: Box<dyn RandomSource>,
    observer: Box<dyn SequencerObserver>,
}

impl StepSequencer {
    pub fn new(step_count: StepCount, rng: Box<dyn RandomSource>) -> Self {
        Self {
            pattern: Pattern::new(step_count),
            muted: BTreeSet::new(),
            soloed: BTreeSet::new(),
            remix_amount: 0.0,
            rng,
            observer: Box::new(NullObserver),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn SequencerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn toggle_step(&mut self, track: TrackId, step: usize) -> Result<bool> {
        let on = self.pattern.toggle(track, step)?;
        self.observer.pattern_changed(track);
        Ok(on)
    }

    pub fn randomize_track(&mut self, track: TrackId) {
        self.pattern.fill_random(track, RANDOMIZE_DENSITY, self.rng.as_mut());
        self.observer.pattern_changed(track);
    }

    pub fn randomize_all(&mut self) {
        for track in TrackId::ALL {
            self.randomize_track(track);
        }
    }

    pub fn clear_track(&mut self, track: TrackId) {
        self.pattern.clear(track);
        self.observer.pattern_changed(track);
    }

    /// Clamp into 0..1; NaN disables remix
    pub fn set_remix_amount(&mut self, amount: f64) -> f64 {
        self.remix_amount = if amount.is_finite() { amount.clamp(0.0, 1.0) } else { 0.0 };
        self.remix_amount
    }

    pub fn remix_amount(&self) -> f64 {
        self.remix_amount
    }

    pub fn set_muted(&mut self, track: TrackId, muted: bool) {
        if muted {
            self.muted.insert(track);
        } else {
            self.muted.remove(&track);
        }
    }

    pub fn set_soloed(&mut self, track: TrackId, soloed: bool) {
        if soloed {
            self.soloed.insert(track);
        } else {
            self.soloed.remove(&track);
        }
    }

    pub fn is_muted(&self, track: TrackId) -> bool {
        self.muted.contains(&track)
    }

    pub fn is_soloed(&self, track: TrackId) -> bool {
        self.soloed.contains(&track)
    }

    pub fn any_soloed(&self) -> bool {
        !self.soloed.is_empty()
    }

    /// Whether mute/solo lets a track sound at all
    pub fn is_audible(&self, track: TrackId) -> bool {
        if self.any_soloed() {
            self.is_soloed(track)
        } else {
            !self.is_muted(track)
        }
    }

    /// Dispatch one subdivision; returns the pattern step it played
    pub fn tick(&mut self, tick: StepTick, sink: &mut dyn TriggerSink) -> usize {
        let step = (tick.index % self.pattern.len() as u64) as usize;
        for track in TrackId::ALL {
            let mut should_play = self.pattern.get(track, step);
            if self.remix_amount > 0.0 {
                should_play |= self.rng.next_f64() < self.remix_amount * REMIX_SCALE;
            }
            if should_play && self.is_audible(track) {
                sink.trigger(track, tick.time, DEFAULT_VELOCITY);
            }
        }
        self.observer.step_changed(step, tick.time, tick.generation);
        step
    }
}
