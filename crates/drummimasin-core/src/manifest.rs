//! Sample manifest: track name to candidate file locations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::random::RandomSource;
use crate::track::TrackId;

/// Manifest key for the pitched instrument's sample
pub const PIANO_KEY: &str = "piano";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleManifest {
    entries: BTreeMap<String, Vec<String>>,
}

impl SampleManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Candidates under `key`; empty when the key is missing
    pub fn candidates(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn for_track(&self, track: TrackId) -> &[String] {
        self.candidates(track.name())
    }

    pub fn pick(&self, key: &str, rng: &mut dyn RandomSource) -> Option<&str> {
        let candidates = self.candidates(key);
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.next_index(candidates.len())].as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn insert(&mut self, key: impl Into<String>, locations: Vec<String>) {
        self.entries.insert(key.into(), locations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRandom;

    #[test]
    fn test_manifest_parse_and_lookup() {
        let json = r#"{"kick": ["kicks/a.wav", "kicks/b.wav"], "piano": ["keys/c4.wav"]}"#;
        let manifest = SampleManifest::from_json(json).unwrap();
        assert_eq!(manifest.for_track(TrackId::Kick).len(), 2);
        assert!(manifest.for_track(TrackId::Snare).is_empty());
        assert_eq!(manifest.candidates(PIANO_KEY), ["keys/c4.wav".to_string()]);
        assert!(!manifest.is_empty());
    }

    #[test]
    fn test_pick_from_candidates() {
        let manifest = SampleManifest::from_json(r#"{"hihat": ["x.wav", "y.wav"]}"#).unwrap();
        let mut rng = SeededRandom::new(11);
        for _ in 0..20 {
            let pick = manifest.pick("hihat", &mut rng).unwrap();
            assert!(pick == "x.wav" || pick == "y.wav");
        }
        assert!(manifest.pick("snare", &mut rng).is_none());
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        assert!(SampleManifest::from_json("[1, 2").is_err());
        assert!(SampleManifest::default().is_empty());
    }
}
