//! One-shot manifest fetch at startup

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, bounded};
use drummimasin_core::SampleManifest;
use tracing::{info, warn};

use crate::sample_loader::SampleFetcher;

/// Fetch and parse a manifest; any failure yields an empty one
pub fn fetch_manifest(fetcher: &dyn SampleFetcher, location: &str) -> SampleManifest {
    let bytes = match fetcher.fetch(location) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(location, error = %e, "Sample manifest unavailable");
            return SampleManifest::default();
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    match SampleManifest::from_json(&text) {
        Ok(manifest) => {
            info!(location, "Sample manifest loaded");
            manifest
        }
        Err(e) => {
            warn!(location, error = %e, "Sample manifest is malformed");
            SampleManifest::default()
        }
    }
}

/// Fetch on a background thread; the receiver yields exactly one manifest
pub fn spawn_manifest_fetch(fetcher: Arc<dyn SampleFetcher>, location: String) -> Receiver<SampleManifest> {
    let (tx, rx) = bounded(1);
    let spawned = thread::Builder::new()
        .name("manifest-fetch".into())
        .spawn(move || {
            let _ = tx.send(fetch_manifest(fetcher.as_ref(), &location));
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Could not start manifest fetch");
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_loader::DefaultFetcher;
    use drummimasin_core::TrackId;
    use std::time::Duration;

    #[test]
    fn test_manifest_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"kick": ["k1.wav", "k2.wav"], "snare": ["s.wav"]}"#,
        )
        .unwrap();
        let fetcher: Arc<dyn SampleFetcher> = Arc::new(DefaultFetcher::with_base_dir(dir.path()));
        let rx = spawn_manifest_fetch(fetcher, "manifest.json".into());
        let manifest = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(manifest.for_track(TrackId::Kick).len(), 2);
        assert!(manifest.for_track(TrackId::HiHat).is_empty());
    }

    #[test]
    fn test_missing_or_malformed_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let fetcher = DefaultFetcher::with_base_dir(dir.path());
        assert!(fetch_manifest(&fetcher, "absent.json").is_empty());
        assert!(fetch_manifest(&fetcher, "bad.json").is_empty());
    }
}
