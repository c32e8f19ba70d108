//! Live loop capture: debounce, bounded recording, and peak normalization

use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::voices::SampleBuffer;
use crate::voices::sample_player::resample;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Finalizer worker is not running")]
    WorkerGone,
    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("Resample failed: {0}")]
    Resample(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Preparing,
    Recording,
    /// Capture handed off, waiting for the finalized loop
    Stopped,
}

/// Unprocessed capture handed to the finalizer
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Whether the length cap ended the take
    pub auto: bool,
}

/// What a record request did
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Preparing,
    /// Second press during the debounce
    Cancelled,
    /// Second press while recording stops the take
    Stopped(RawCapture),
    /// No usable capture source
    Disabled,
}

/// Recording session state machine, driven by the audio clock
#[derive(Debug)]
pub struct Recorder {
    config: RecorderConfig,
    state: RecordingState,
    requested_at: f64,
    started_at: f64,
    buffer: Vec<f32>,
    sample_rate: u32,
    max_samples: usize,
    disabled: bool,
}

impl Recorder {
    pub fn new(config: RecorderConfig, sample_rate: u32) -> Self {
        let mut recorder = Self {
            config,
            state: RecordingState::Idle,
            requested_at: 0.0,
            started_at: 0.0,
            buffer: Vec::new(),
            sample_rate,
            max_samples: 0,
            disabled: false,
        };
        recorder.set_source_rate(sample_rate);
        recorder
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// No capture source; later start requests report `Disabled`
    pub fn disable(&mut self) {
        self.disabled = true;
        self.state = RecordingState::Idle;
        self.buffer = Vec::new();
    }

    /// Rate of the audio fed to `capture`
    pub fn set_source_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.max_samples = (self.config.max_duration_ms as u128 * sample_rate as u128 / 1000) as usize;
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn captured_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    pub fn start(&mut self, now: f64) -> StartOutcome {
        if self.disabled {
            return StartOutcome::Disabled;
        }
        match self.state {
            RecordingState::Recording => match self.take(false) {
                Some(raw) => StartOutcome::Stopped(raw),
                None => StartOutcome::Cancelled,
            },
            RecordingState::Preparing => {
                debug!("Recording cancelled during debounce");
                self.state = RecordingState::Idle;
                StartOutcome::Cancelled
            }
            RecordingState::Idle | RecordingState::Stopped => {
                self.state = RecordingState::Preparing;
                self.requested_at = now;
                self.buffer.clear();
                debug!(now, "Recording requested");
                StartOutcome::Preparing
            }
        }
    }

    /// End the take; `None` unless audio was being recorded
    pub fn stop(&mut self) -> Option<RawCapture> {
        match self.state {
            RecordingState::Recording => self.take(false),
            RecordingState::Preparing => {
                self.state = RecordingState::Idle;
                None
            }
            RecordingState::Idle | RecordingState::Stopped => None,
        }
    }

    fn take(&mut self, auto: bool) -> Option<RawCapture> {
        if self.state != RecordingState::Recording {
            return None;
        }
        self.state = RecordingState::Stopped;
        let samples = std::mem::take(&mut self.buffer);
        info!(samples = samples.len(), auto, "Recording stopped");
        Some(RawCapture { samples, sample_rate: self.sample_rate, auto })
    }

    /// Leave the debounce once it has elapsed on the audio clock
    pub fn advance(&mut self, now: f64) {
        if self.state != RecordingState::Preparing {
            return;
        }
        let debounce = self.config.debounce_ms as f64 / 1000.0;
        if now - self.requested_at >= debounce {
            self.state = RecordingState::Recording;
            self.started_at = now;
            self.buffer.reserve(self.max_samples);
            info!(now, "Recording started");
        }
    }

    /// Append mono audio; returns the take once it reaches the length cap
    pub fn capture(&mut self, samples: &[f32]) -> Option<RawCapture> {
        if self.state != RecordingState::Recording {
            return None;
        }
        let room = self.max_samples.saturating_sub(self.buffer.len());
        self.buffer.extend_from_slice(&samples[..samples.len().min(room)]);
        if self.buffer.len() >= self.max_samples {
            return self.take(true);
        }
        None
    }

    /// The finalized loop has been handed to its voice
    pub fn finish(&mut self) {
        if self.state == RecordingState::Stopped {
            self.state = RecordingState::Idle;
        }
    }
}

/// Scale so the loudest sample hits 1.0; silence is left alone. Returns the original peak.
pub fn normalize_peak(samples: &mut [f32]) -> f32 {
    let peak = samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        let gain = 1.0 / peak;
        for s in samples.iter_mut() {
            *s *= gain;
        }
    }
    peak
}

/// A normalized loop at the engine sample rate
#[derive(Debug, Clone)]
pub struct CapturedLoop {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub auto: bool,
}

impl CapturedLoop {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }

    pub fn to_sample_buffer(&self) -> SampleBuffer {
        SampleBuffer::from_samples("live", self.samples.clone(), self.sample_rate)
    }

    /// Write as a mono 32-bit float WAV
    pub fn write_wav(&self, path: &Path) -> Result<(), RecorderError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for sample in &self.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        info!(path = %path.display(), frames = self.samples.len(), "Wrote captured loop");
        Ok(())
    }
}

/// What the finalizer hands back for each take
pub type Finalized = Result<CapturedLoop, RecorderError>;

/// Normalize and bring a raw take to the engine rate
pub fn finalize(raw: RawCapture, engine_rate: u32) -> Finalized {
    if raw.sample_rate == 0 {
        return Err(RecorderError::Resample("capture has no sample rate".into()));
    }
    let mut samples = resample(&raw.samples, raw.sample_rate, engine_rate)
        .map_err(|e| RecorderError::Resample(e.to_string()))?;
    let peak = normalize_peak(&mut samples);
    if peak == 0.0 {
        debug!("Captured loop is silent, normalization skipped");
    }
    Ok(CapturedLoop { samples, sample_rate: engine_rate, auto: raw.auto })
}

/// Worker thread that finalizes takes off the audio thread
pub struct CaptureFinalizer {
    job_tx: Option<Sender<RawCapture>>,
    done_rx: Receiver<Finalized>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureFinalizer {
    pub fn spawn(engine_rate: u32) -> Self {
        let (job_tx, job_rx) = unbounded::<RawCapture>();
        let (done_tx, done_rx) = unbounded();

        let worker = thread::Builder::new()
            .name("capture-finalizer".into())
            .spawn(move || {
                for raw in job_rx {
                    let finalized = finalize(raw, engine_rate);
                    if let Err(e) = &finalized {
                        warn!(error = %e, "Failed to finalize capture");
                    }
                    if done_tx.send(finalized).is_err() {
                        break;
                    }
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Could not start capture finalizer");
                None
            }
        };

        Self { job_tx: Some(job_tx), done_rx, worker }
    }

    /// Never blocks; safe from the render thread
    pub fn submit(&self, raw: RawCapture) -> Result<(), RecorderError> {
        if self.worker.is_none() {
            return Err(RecorderError::WorkerGone);
        }
        self.job_tx
            .as_ref()
            .ok_or(RecorderError::WorkerGone)?
            .send(raw)
            .map_err(|_| RecorderError::WorkerGone)
    }

    /// Cloned handle for consumers waiting on finished takes
    pub fn receiver(&self) -> Receiver<Finalized> {
        self.done_rx.clone()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Finalized> {
        self.done_rx.recv_timeout(timeout).ok()
    }
}

impl std::fmt::Debug for CaptureFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureFinalizer")
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl Drop for CaptureFinalizer {
    fn drop(&mut self) {
        // closing the job channel ends the worker loop
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 1000;

    fn recorder() -> Recorder {
        Recorder::new(RecorderConfig::default(), SR)
    }

    fn recording(now: f64) -> Recorder {
        let mut rec = recorder();
        assert!(matches!(rec.start(now), StartOutcome::Preparing));
        rec.advance(now + 0.5);
        assert_eq!(rec.state(), RecordingState::Recording);
        rec
    }

    #[test]
    fn test_debounce_before_recording() {
        let mut rec = recorder();
        rec.start(1.0);
        rec.advance(1.2);
        assert_eq!(rec.state(), RecordingState::Preparing);
        assert!(rec.capture(&[0.5; 10]).is_none());
        rec.advance(1.5);
        assert_eq!(rec.state(), RecordingState::Recording);
        assert_eq!(rec.captured_len(), 0);
    }

    #[test]
    fn test_start_while_preparing_cancels() {
        let mut rec = recorder();
        rec.start(0.0);
        assert!(matches!(rec.start(0.1), StartOutcome::Cancelled));
        assert_eq!(rec.state(), RecordingState::Idle);
    }

    #[test]
    fn test_start_while_recording_stops() {
        let mut rec = recording(0.0);
        rec.capture(&[0.25; 300]);
        let StartOutcome::Stopped(raw) = rec.start(2.0) else {
            panic!("expected the take to stop");
        };
        assert_eq!(raw.samples.len(), 300);
        assert!(!raw.auto);
        assert_eq!(rec.state(), RecordingState::Stopped);
        rec.finish();
        assert_eq!(rec.state(), RecordingState::Idle);
    }

    #[test]
    fn test_auto_stop_at_max_duration() {
        let mut rec = recording(0.0);
        assert_eq!(rec.max_samples(), 10 * SR as usize);
        let mut result = None;
        for _ in 0..200 {
            if let Some(raw) = rec.capture(&[0.1; 64]) {
                result = Some(raw);
                break;
            }
        }
        let raw = result.expect("recorder should stop itself");
        assert!(raw.auto);
        assert_eq!(raw.samples.len(), 10 * SR as usize);
        assert_eq!(rec.state(), RecordingState::Stopped);
        assert!(rec.capture(&[0.1; 64]).is_none());
    }

    #[test]
    fn test_disabled_recorder_refuses() {
        let mut rec = recorder();
        rec.disable();
        assert!(matches!(rec.start(0.0), StartOutcome::Disabled));
        assert_eq!(rec.state(), RecordingState::Idle);
    }

    #[test]
    fn test_normalize_peak() {
        let mut loud = vec![0.1, -0.4, 0.2];
        assert!((normalize_peak(&mut loud) - 0.4).abs() < 1e-6);
        let max = loud.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!((max - 1.0).abs() < 1e-6);
        assert!((loud[0] - 0.25).abs() < 1e-6);

        let mut silent = vec![0.0; 16];
        assert_eq!(normalize_peak(&mut silent), 0.0);
        assert!(silent.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_finalizer_worker_normalizes() {
        let finalizer = CaptureFinalizer::spawn(SR);
        finalizer
            .submit(RawCapture { samples: vec![0.0, 0.5, -0.25], sample_rate: SR, auto: true })
            .unwrap();
        let captured = finalizer.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(captured.samples, vec![0.0, 1.0, -0.5]);
        assert!(captured.auto);
    }

    #[test]
    fn test_finalizer_reports_failed_take() {
        let finalizer = CaptureFinalizer::spawn(SR);
        finalizer
            .submit(RawCapture { samples: vec![0.5; 8], sample_rate: 0, auto: false })
            .unwrap();
        let finalized = finalizer.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(finalized, Err(RecorderError::Resample(_))));
    }

    #[test]
    fn test_write_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.wav");
        let captured = CapturedLoop { samples: vec![0.0, 1.0, -0.5, 0.25], sample_rate: 48000, auto: false };
        captured.write_wav(&path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 48000);
        assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
        let samples: Vec<f32> = reader.into_samples::<f32>().map(Result::unwrap).collect();
        assert_eq!(samples, captured.samples);
    }
}
