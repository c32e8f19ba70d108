//! Device-backed engine: owns the output stream and the worker threads around `DrumEngine`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use drummimasin_core::{PIANO_KEY, SampleManifest, SeededRandom, TrackId, TrackState};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio_input::{AudioInputError, AudioInputService, InputStreamHandle};
use crate::audio_io::{AudioOutputError, RealtimeOutputStream};
use crate::config::EngineConfig;
use crate::drum_engine::DrumEngine;
use crate::manifest_loader::spawn_manifest_fetch;
use crate::notify::{DrawQueue, UiNotifier};
use crate::recorder::{CapturedLoop, Finalized, RecordingState};
use crate::sample_loader::{LoadRequest, LoadResult, LoadTarget, SampleFetcher, SampleLoader};

/// Capture chunks buffered between the input callback and the render thread
const INPUT_QUEUE_CHUNKS: usize = 64;

#[derive(Debug, Error)]
pub enum AudioEngineError {
    #[error("Audio output error: {0}")]
    Output(#[from] AudioOutputError),
    #[error("Audio input error: {0}")]
    Input(#[from] AudioInputError),
    #[error("Engine already running")]
    AlreadyRunning,
    #[error("Engine not running")]
    NotRunning,
}

pub struct AudioEngine {
    engine: Arc<Mutex<DrumEngine>>,
    stream: Option<RealtimeOutputStream>,
    input: Option<InputStreamHandle>,
    fetcher: Arc<dyn SampleFetcher>,
    loader: SampleLoader,
    next_request: u64,
    manifest: SampleManifest,
    manifest_rx: Option<Receiver<SampleManifest>>,
    captures: Receiver<Finalized>,
    last_capture: Option<CapturedLoop>,
    rng: SeededRandom,
    sample_rate: u32,
}

impl AudioEngine {
    /// Build the engine; the returned queue yields UI events in audio-clock order
    pub fn new(config: &EngineConfig, sample_rate: u32, fetcher: Arc<dyn SampleFetcher>) -> (Self, DrawQueue) {
        let (notifier, events) = UiNotifier::channel();
        let drum = DrumEngine::new(config, sample_rate, notifier);
        let captures = drum.capture_receiver();
        let rng = match config.seed {
            Some(seed) => SeededRandom::new(seed.rotate_left(17)),
            None => SeededRandom::from_entropy(),
        };

        let engine = Self {
            engine: Arc::new(Mutex::new(drum)),
            stream: None,
            input: None,
            loader: SampleLoader::spawn(fetcher.clone(), sample_rate),
            fetcher,
            next_request: 1,
            manifest: SampleManifest::default(),
            manifest_rx: None,
            captures,
            last_capture: None,
            rng,
            sample_rate,
        };
        (engine, DrawQueue::new(events))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Shared engine for callers that render themselves
    pub fn engine(&self) -> Arc<Mutex<DrumEngine>> {
        self.engine.clone()
    }

    pub fn with_engine<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut DrumEngine) -> R,
    {
        self.engine.lock().ok().map(|mut e| f(&mut e))
    }

    /// Audio clock in seconds
    pub fn now(&self) -> f64 {
        self.with_engine(|e| e.now()).unwrap_or(0.0)
    }

    pub fn start_output(&mut self) -> Result<(), AudioEngineError> {
        if self.stream.is_some() {
            return Err(AudioEngineError::AlreadyRunning);
        }

        let engine = self.engine.clone();
        let stream = RealtimeOutputStream::start(self.sample_rate, move |buffer, _rate, channels| {
            match engine.lock() {
                Ok(mut engine) => engine.render(buffer, channels),
                Err(_) => buffer.fill(0.0),
            }
        })?;

        if stream.sample_rate() != self.sample_rate {
            warn!(
                engine = self.sample_rate,
                device = stream.sample_rate(),
                "Device rate differs from engine rate, playback will be off-pitch"
            );
        }

        self.stream = Some(stream);
        info!("Audio output started");
        Ok(())
    }

    pub fn stop_output(&mut self) -> Result<(), AudioEngineError> {
        let stream = self.stream.take().ok_or(AudioEngineError::NotRunning)?;
        stream.stop();
        info!("Audio output stopped");
        Ok(())
    }

    pub fn is_output_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Route a capture device into the recorder; on failure the recorder is disabled
    pub fn enable_capture_input(&mut self, device_id: &str) -> Result<(), AudioEngineError> {
        let (tx, rx) = bounded(INPUT_QUEUE_CHUNKS);
        match AudioInputService::start_stream(device_id, tx) {
            Ok(handle) => {
                let rate = handle.sample_rate();
                self.with_engine(|e| e.attach_input(rx, rate));
                self.input = Some(handle);
                Ok(())
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "Capture device unavailable, recording disabled");
                self.with_engine(DrumEngine::disable_recorder);
                Err(e.into())
            }
        }
    }

    // -- samples --

    /// Start fetching the manifest; `poll` picks it up
    pub fn fetch_manifest(&mut self, location: &str) {
        self.manifest_rx = Some(spawn_manifest_fetch(self.fetcher.clone(), location.to_string()));
    }

    pub fn manifest(&self) -> &SampleManifest {
        &self.manifest
    }

    /// Queue an async load; the result is applied by `poll`
    pub fn load_sample(&mut self, target: LoadTarget, location: &str) -> u64 {
        let id = self.next_request;
        self.next_request += 1;
        self.with_engine(|e| e.begin_load(target, id));

        let request = LoadRequest { id, target, location: location.to_string() };
        if !self.loader.request(request) {
            let result = LoadResult {
                id,
                target,
                location: location.to_string(),
                outcome: Err("sample loader is not running".into()),
            };
            self.with_engine(|e| e.finish_load(result));
        }
        id
    }

    /// Load a random manifest candidate for `track`
    pub fn randomize_sample(&mut self, track: TrackId) -> Option<u64> {
        self.randomize_key(track.name(), LoadTarget::Track(track))
    }

    pub fn randomize_all_samples(&mut self) -> usize {
        TrackId::DRUMS
            .iter()
            .filter_map(|track| self.randomize_sample(*track))
            .count()
    }

    fn randomize_key(&mut self, key: &str, target: LoadTarget) -> Option<u64> {
        let Some(location) = self.manifest.pick(key, &mut self.rng).map(str::to_string) else {
            debug!(key, "No manifest candidates");
            return None;
        };
        Some(self.load_sample(target, &location))
    }

    // -- recording --

    pub fn start_recording(&self) -> RecordingState {
        self.with_engine(DrumEngine::start_recording).unwrap_or_default()
    }

    pub fn stop_recording(&self) -> RecordingState {
        self.with_engine(DrumEngine::stop_recording).unwrap_or_default()
    }

    /// Block until the next take is finalized and hand it to the live track.
    /// `None` on timeout or when the take failed.
    pub fn wait_for_capture(&mut self, timeout: Duration) -> Option<CapturedLoop> {
        let finalized = self.captures.recv_timeout(timeout).ok()?;
        self.apply_capture(finalized)
    }

    pub fn last_capture(&self) -> Option<&CapturedLoop> {
        self.last_capture.as_ref()
    }

    fn apply_capture(&mut self, finalized: Finalized) -> Option<CapturedLoop> {
        match finalized {
            Ok(captured) => {
                self.with_engine(|e| e.assign_live_loop(&captured));
                self.last_capture = Some(captured.clone());
                Some(captured)
            }
            Err(e) => {
                self.with_engine(|engine| engine.capture_failed(&e));
                None
            }
        }
    }

    pub fn track_state(&self, track: TrackId) -> Option<TrackState> {
        self.with_engine(|e| e.track_state(track))
    }

    /// Apply worker results between render blocks; returns how many were applied
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;

        let manifest = self.manifest_rx.as_ref().and_then(|rx| rx.try_recv().ok());
        if let Some(manifest) = manifest {
            self.manifest = manifest;
            self.manifest_rx = None;
            applied += 1;
            self.randomize_key(PIANO_KEY, LoadTarget::Piano);
        }

        while let Some(result) = self.loader.try_recv() {
            self.with_engine(|e| e.finish_load(result));
            applied += 1;
        }

        while let Ok(finalized) = self.captures.try_recv() {
            self.apply_capture(finalized);
            applied += 1;
        }

        applied
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if self.is_output_running() {
            if let Err(e) = self.stop_output() {
                warn!(error = %e, "Failed to stop audio output");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_loader::SampleLoadError;
    use drummimasin_core::VoiceMode;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::time::Instant;

    #[derive(Default)]
    struct MemoryFetcher {
        files: HashMap<String, Vec<u8>>,
    }

    impl SampleFetcher for MemoryFetcher {
        fn fetch(&self, location: &str) -> Result<Vec<u8>, SampleLoadError> {
            self.files.get(location).cloned().ok_or_else(|| SampleLoadError::Io {
                path: location.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    fn wav(len: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..len {
                writer.write_sample(8000_i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn engine(files: &[(&str, Vec<u8>)]) -> AudioEngine {
        let fetcher = MemoryFetcher {
            files: files.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        };
        let config = EngineConfig { seed: Some(3), ..EngineConfig::default() };
        AudioEngine::new(&config, 48000, Arc::new(fetcher)).0
    }

    fn poll_until(engine: &mut AudioEngine, done: impl Fn(&AudioEngine) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(engine) {
            assert!(Instant::now() < deadline, "timed out");
            engine.poll();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_device_failures_are_reported() {
        let mut engine = engine(&[]);
        assert!(matches!(engine.stop_output(), Err(AudioEngineError::NotRunning)));

        let result = engine.enable_capture_input("no such capture device");
        assert!(matches!(result, Err(AudioEngineError::Input(_))));
        assert!(engine.with_engine(|e| e.recorder().is_disabled()).unwrap());
        assert_eq!(engine.start_recording(), RecordingState::Idle);
    }

    #[test]
    fn test_load_sample_switches_mode_after_poll() {
        let mut engine = engine(&[("kick.wav", wav(64))]);
        engine.load_sample(LoadTarget::Track(TrackId::Kick), "kick.wav");
        poll_until(&mut engine, |e| {
            e.track_state(TrackId::Kick).is_some_and(|s| s.mode == VoiceMode::Sample)
        });
        assert!(engine.track_state(TrackId::Kick).unwrap().has_sample);
    }

    #[test]
    fn test_failed_load_reverts_after_poll() {
        let mut engine = engine(&[]);
        engine.load_sample(LoadTarget::Track(TrackId::HiHat), "missing.wav");
        poll_until(&mut engine, |e| {
            e.with_engine(|d| !d.voices().voice(TrackId::HiHat).is_loading()).unwrap_or(false)
        });
        let state = engine.track_state(TrackId::HiHat).unwrap();
        assert_eq!(state.mode, VoiceMode::Synth);
        assert!(!state.has_sample);
    }

    #[test]
    fn test_manifest_drives_randomize_all_samples() {
        let manifest = br#"{"kick": ["k.wav"], "snare": ["s.wav"], "hihat": [], "resonator": ["r.wav"]}"#;
        let mut engine = engine(&[
            ("manifest.json", manifest.to_vec()),
            ("k.wav", wav(32)),
            ("s.wav", wav(32)),
            ("r.wav", wav(32)),
        ]);
        assert_eq!(engine.randomize_all_samples(), 0);

        engine.fetch_manifest("manifest.json");
        poll_until(&mut engine, |e| !e.manifest().is_empty());
        assert_eq!(engine.randomize_all_samples(), 3);
        poll_until(&mut engine, |e| {
            e.track_state(TrackId::Resonator).is_some_and(|s| s.mode == VoiceMode::Sample)
        });
        assert_eq!(engine.track_state(TrackId::HiHat).unwrap().mode, VoiceMode::Synth);
    }
}
