//! Step pattern storage

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DrumError, Result};
use crate::random::RandomSource;
use crate::track::TrackId;

/// Loop length, fixed for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum StepCount {
    #[default]
    Sixteen,
    ThirtyTwo,
}

impl StepCount {
    pub fn len(self) -> usize {
        match self {
            Self::Sixteen => 16,
            Self::ThirtyTwo => 32,
        }
    }
}

impl TryFrom<usize> for StepCount {
    type Error = DrumError;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            16 => Ok(Self::Sixteen),
            32 => Ok(Self::ThirtyTwo),
            other => Err(DrumError::UnsupportedStepCount(other)),
        }
    }
}

impl From<StepCount> for usize {
    fn from(value: StepCount) -> Self {
        value.len()
    }
}

/// On/off grid for every track; all rows share one length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PatternRows")]
pub struct Pattern {
    step_count: StepCount,
    rows: BTreeMap<TrackId, Vec<bool>>,
}

/// Unchecked serialized form of `Pattern`
#[derive(Deserialize)]
struct PatternRows {
    step_count: StepCount,
    #[serde(default)]
    rows: BTreeMap<TrackId, Vec<bool>>,
}

impl TryFrom<PatternRows> for Pattern {
    type Error = DrumError;

    fn try_from(data: PatternRows) -> Result<Self> {
        let mut pattern = Pattern::new(data.step_count);
        let expected = pattern.len();
        for (track, row) in data.rows {
            if row.len() != expected {
                return Err(DrumError::RowLength { track, len: row.len(), expected });
            }
            pattern.rows.insert(track, row);
        }
        Ok(pattern)
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new(StepCount::default())
    }
}

impl Pattern {
    pub fn new(step_count: StepCount) -> Self {
        let rows = TrackId::ALL
            .into_iter()
            .map(|track| (track, vec![false; step_count.len()]))
            .collect();
        Self { step_count, rows }
    }

    pub fn step_count(&self) -> StepCount {
        self.step_count
    }

    pub fn len(&self) -> usize {
        self.step_count.len()
    }

    fn check(&self, step: usize) -> Result<()> {
        if step >= self.len() {
            return Err(DrumError::StepOutOfRange { step, len: self.len() });
        }
        Ok(())
    }

    fn row_mut(&mut self, track: TrackId) -> &mut Vec<bool> {
        let len = self.step_count.len();
        self.rows.entry(track).or_insert_with(|| vec![false; len])
    }

    /// Steps for one track
    pub fn row(&self, track: TrackId) -> &[bool] {
        self.rows.get(&track).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, track: TrackId, step: usize) -> bool {
        self.row(track).get(step).copied().unwrap_or(false)
    }

    pub fn set(&mut self, track: TrackId, step: usize, on: bool) -> Result<()> {
        self.check(step)?;
        self.row_mut(track)[step] = on;
        Ok(())
    }

    /// Flip one step and return its new value
    pub fn toggle(&mut self, track: TrackId, step: usize) -> Result<bool> {
        self.check(step)?;
        let cell = &mut self.row_mut(track)[step];
        *cell = !*cell;
        Ok(*cell)
    }

    pub fn clear(&mut self, track: TrackId) {
        self.row_mut(track).fill(false);
    }

    /// Set each step independently with probability `density`
    pub fn fill_random(&mut self, track: TrackId, density: f64, rng: &mut dyn RandomSource) {
        for cell in self.row_mut(track).iter_mut() {
            *cell = rng.next_f64() < density;
        }
    }

    /// Fraction of steps that are on
    pub fn density(&self, track: TrackId) -> f64 {
        let row = self.row(track);
        if row.is_empty() {
            return 0.0;
        }
        row.iter().filter(|on| **on).count() as f64 / row.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRandom;

    #[test]
    fn test_new_pattern_is_empty_and_rectangular() {
        let pattern = Pattern::new(StepCount::ThirtyTwo);
        for track in TrackId::ALL {
            assert_eq!(pattern.row(track).len(), 32);
            assert_eq!(pattern.density(track), 0.0);
        }
    }

    #[test]
    fn test_toggle_twice_restores() {
        let mut pattern = Pattern::new(StepCount::Sixteen);
        let mut rng = SeededRandom::new(7);
        pattern.fill_random(TrackId::Snare, 0.5, &mut rng);
        let before = pattern.clone();
        for track in TrackId::ALL {
            for step in 0..16 {
                let first = pattern.toggle(track, step).unwrap();
                let second = pattern.toggle(track, step).unwrap();
                assert_eq!(first, !second);
            }
        }
        assert_eq!(pattern, before);
    }

    #[test]
    fn test_out_of_range_step_is_rejected() {
        let mut pattern = Pattern::new(StepCount::Sixteen);
        assert!(matches!(
            pattern.toggle(TrackId::Kick, 16),
            Err(DrumError::StepOutOfRange { step: 16, len: 16 })
        ));
        assert!(!pattern.get(TrackId::Kick, 99));
    }

    #[test]
    fn test_deserialize_checks_row_length() {
        let mut pattern = Pattern::new(StepCount::Sixteen);
        pattern.set(TrackId::HiHat, 3, true).unwrap();
        let json = serde_json::to_string(&pattern).unwrap();
        let back: Pattern = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pattern);

        let short = r#"{"step_count": 16, "rows": {"kick": [true, false]}}"#;
        let err = serde_json::from_str::<Pattern>(short).unwrap_err();
        assert!(err.to_string().contains("kick has 2 steps"));

        // missing rows come back empty
        let partial: Pattern = serde_json::from_str(r#"{"step_count": 32, "rows": {}}"#).unwrap();
        assert_eq!(partial.row(TrackId::Live).len(), 32);
    }

    #[test]
    fn test_step_count_parsing() {
        assert_eq!(StepCount::try_from(32).unwrap(), StepCount::ThirtyTwo);
        assert!(StepCount::try_from(12).is_err());
    }
}
