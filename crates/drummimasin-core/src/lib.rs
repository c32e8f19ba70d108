//! Drummimasin core domain types
//!
//! Tracks, step patterns, the transport clock and the sequencer. No audio I/O lives here.

pub mod error;
pub mod input;
pub mod manifest;
pub mod pattern;
pub mod random;
pub mod sequencer;
pub mod track;
pub mod transport;

pub use error::{DrumError, Result};
pub use input::{KeyAction, MidiMessage, NoteRoute, PianoKeyboard, key_action, route_note};
pub use manifest::{PIANO_KEY, SampleManifest};
pub use pattern::{Pattern, StepCount};
pub use random::{RandomSource, ScriptedRandom, SeededRandom};
pub use sequencer::{NullObserver, SequencerObserver, StepSequencer, TriggerSink};
pub use track::{DelaySettings, DelayTime, TrackId, TrackState, VoiceMode, Volume};
pub use transport::{StepTick, Transport, TransportState};
