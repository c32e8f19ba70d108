//! Error types for drummimasin

use thiserror::Error;

use crate::track::TrackId;

#[derive(Debug, Error)]
pub enum DrumError {
    #[error("Unknown track: {0}")]
    UnknownTrack(String),
    #[error("Unknown voice mode: {0}")]
    UnknownMode(String),
    #[error("Step {step} out of range for a {len}-step pattern")]
    StepOutOfRange { step: usize, len: usize },
    #[error("Unsupported step count: {0} (expected 16 or 32)")]
    UnsupportedStepCount(usize),
    #[error("Track {track} has {len} steps, pattern has {expected}")]
    RowLength { track: TrackId, len: usize, expected: usize },
    #[error("Track {0} has no synth generator")]
    NoSynth(TrackId),
    #[error("Track {0} has no sample loaded")]
    NoSample(TrackId),
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DrumError>;
