//! Engine settings, deserialized from the `[engine]` table of the app config

use drummimasin_core::StepCount;
use drummimasin_core::transport::DEFAULT_BPM;
use serde::{Deserialize, Serialize};

/// Which signal the recorder listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTap {
    /// The engine's own master output
    #[default]
    Master,
    /// A capture device
    Input,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub debounce_ms: u64,
    pub max_duration_ms: u64,
    pub tap: CaptureTap,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            max_duration_ms: 10_000,
            tap: CaptureTap::Master,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    pub decay_secs: f32,
    pub wet: f32,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self { decay_secs: 4.0, wet: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bpm: f64,
    pub step_count: StepCount,
    /// How far past the current block steps are queued
    pub lookahead_ms: u64,
    /// Put every drum track in synth mode at startup
    pub synth_on_start: bool,
    /// Fixed seed for reproducible patterns; random when absent
    pub seed: Option<u64>,
    pub recorder: RecorderConfig,
    pub reverb: ReverbConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            step_count: StepCount::Sixteen,
            lookahead_ms: 100,
            synth_on_start: true,
            seed: None,
            recorder: RecorderConfig::default(),
            reverb: ReverbConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }
}
