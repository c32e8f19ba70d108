//! drummimasin-services: voices, effects, recorder and the realtime engine

pub mod audio_effects;
pub mod audio_engine;
pub mod audio_input;
pub mod audio_io;
pub mod config;
pub mod drum_engine;
pub mod effects_graph;
pub mod manifest_loader;
pub mod notify;
pub mod recorder;
pub mod sample_loader;
pub mod voices;

pub use audio_effects::{AudioEffect, EffectChain, EffectParam};
pub use audio_engine::{AudioEngine, AudioEngineError};
pub use audio_input::{AudioInputError, AudioInputService, InputStreamHandle};
pub use audio_io::{AudioOutputError, AudioOutputService, OutputDeviceInfo, RealtimeOutputStream};
pub use config::{CaptureTap, EngineConfig, RecorderConfig, ReverbConfig};
pub use drum_engine::DrumEngine;
pub use effects_graph::EffectsGraph;
pub use notify::{DrawQueue, UiEvent, UiNotifier};
pub use recorder::{CapturedLoop, Finalized, Recorder, RecorderError, RecordingState, normalize_peak};
pub use sample_loader::{DefaultFetcher, LoadTarget, SampleFetcher, SampleLoadError, SampleLoader};
pub use voices::{SampleBuffer, Voice, VoiceBank};
