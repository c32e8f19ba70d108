//! Background fetching and decoding of sample files

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use drummimasin_core::TrackId;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::voices::{DecodeError, SampleBuffer};

/// Largest file accepted from the network
const MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SampleLoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Resolves a location to raw file bytes
pub trait SampleFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, SampleLoadError>;
}

/// Fetches `http(s)://` locations with ureq and everything else from disk
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher {
    base_dir: Option<PathBuf>,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative paths are resolved against `dir`
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: Some(dir.into()) }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = Path::new(location);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

impl SampleFetcher for DefaultFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, SampleLoadError> {
        if is_remote(location) {
            let response = ureq::get(location)
                .call()
                .map_err(|e| SampleLoadError::Http(e.to_string()))?;
            let mut bytes = Vec::new();
            response
                .into_reader()
                .take(MAX_DOWNLOAD_BYTES)
                .read_to_end(&mut bytes)
                .map_err(|e| SampleLoadError::Http(e.to_string()))?;
            return Ok(bytes);
        }
        let path = self.resolve(location);
        std::fs::read(&path).map_err(|source| SampleLoadError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Who receives a loaded sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTarget {
    Track(TrackId),
    Piano,
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub id: u64,
    pub target: LoadTarget,
    pub location: String,
}

#[derive(Debug)]
pub struct LoadResult {
    pub id: u64,
    pub target: LoadTarget,
    pub location: String,
    pub outcome: Result<SampleBuffer, String>,
}

/// Fetch and decode in one step
pub fn load_sample(
    fetcher: &dyn SampleFetcher,
    location: &str,
    engine_rate: u32,
) -> Result<SampleBuffer, SampleLoadError> {
    let bytes = fetcher.fetch(location)?;
    let name = location.rsplit('/').next().unwrap_or(location);
    Ok(SampleBuffer::decode_wav(&bytes, name, engine_rate)?)
}

/// Single worker thread; results arrive in request order
pub struct SampleLoader {
    request_tx: Option<Sender<LoadRequest>>,
    result_rx: Receiver<LoadResult>,
    worker: Option<JoinHandle<()>>,
}

impl SampleLoader {
    pub fn spawn(fetcher: Arc<dyn SampleFetcher>, engine_rate: u32) -> Self {
        let (request_tx, request_rx) = unbounded::<LoadRequest>();
        let (result_tx, result_rx) = unbounded();

        let worker = thread::Builder::new()
            .name("sample-loader".into())
            .spawn(move || {
                for request in request_rx {
                    debug!(id = request.id, location = %request.location, "Loading sample");
                    let outcome = load_sample(fetcher.as_ref(), &request.location, engine_rate)
                        .map_err(|e| e.to_string());
                    match &outcome {
                        Ok(buffer) => info!(location = %request.location, frames = buffer.len(), "Sample loaded"),
                        Err(e) => warn!(location = %request.location, error = %e, "Sample load failed"),
                    }
                    let result = LoadResult {
                        id: request.id,
                        target: request.target,
                        location: request.location,
                        outcome,
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Could not start sample loader");
                None
            }
        };

        Self { request_tx: Some(request_tx), result_rx, worker }
    }

    /// Queue a load; false if the worker is gone
    pub fn request(&self, request: LoadRequest) -> bool {
        self.worker.is_some()
            && self
                .request_tx
                .as_ref()
                .is_some_and(|tx| tx.send(request).is_ok())
    }

    pub fn try_recv(&self) -> Option<LoadResult> {
        self.result_rx.try_recv().ok()
    }

    pub fn receiver(&self) -> &Receiver<LoadResult> {
        &self.result_rx
    }
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoader")
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl Drop for SampleLoader {
    fn drop(&mut self) {
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_default_fetcher_reads_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kick.wav"), wav_bytes(&[0.5; 32], 48000)).unwrap();

        let fetcher = DefaultFetcher::with_base_dir(dir.path());
        let buffer = load_sample(&fetcher, "kick.wav", 48000).unwrap();
        assert_eq!(buffer.len(), 32);
        assert_eq!(buffer.name(), "kick.wav");

        assert!(matches!(
            load_sample(&fetcher, "missing.wav", 48000),
            Err(SampleLoadError::Io { .. })
        ));
    }

    #[test]
    fn test_worker_reports_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("snare.wav"), wav_bytes(&[0.25; 16], 48000)).unwrap();
        std::fs::write(dir.path().join("broken.wav"), b"nope").unwrap();

        let loader = SampleLoader::spawn(Arc::new(DefaultFetcher::with_base_dir(dir.path())), 48000);
        assert!(loader.request(LoadRequest {
            id: 1,
            target: LoadTarget::Track(TrackId::Snare),
            location: "snare.wav".into(),
        }));
        assert!(loader.request(LoadRequest {
            id: 2,
            target: LoadTarget::Piano,
            location: "broken.wav".into(),
        }));

        let first = loader.receiver().recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.target, LoadTarget::Track(TrackId::Snare));
        assert_eq!(first.outcome.unwrap().len(), 16);

        let second = loader.receiver().recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second.target, LoadTarget::Piano);
        assert!(second.outcome.is_err());
    }
}
