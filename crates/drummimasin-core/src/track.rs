//! Track identifiers and per-track parameters

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DrumError;

/// One of the fixed rhythmic voice slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackId {
    Kick,
    Snare,
    HiHat,
    Resonator,
    Live,
}

impl TrackId {
    /// Every track, in sequencer order
    pub const ALL: [TrackId; 5] = [
        TrackId::Kick,
        TrackId::Snare,
        TrackId::HiHat,
        TrackId::Resonator,
        TrackId::Live,
    ];

    /// Tracks with a synthesized drum archetype
    pub const DRUMS: [TrackId; 4] = [
        TrackId::Kick,
        TrackId::Snare,
        TrackId::HiHat,
        TrackId::Resonator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Kick => "kick",
            Self::Snare => "snare",
            Self::HiHat => "hihat",
            Self::Resonator => "resonator",
            Self::Live => "live",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Kick => 0,
            Self::Snare => 1,
            Self::HiHat => 2,
            Self::Resonator => 3,
            Self::Live => 4,
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TrackId {
    type Err = DrumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        TrackId::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| DrumError::UnknownTrack(s.to_string()))
    }
}

/// Sound source a voice plays from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceMode {
    #[default]
    Empty,
    Synth,
    Sample,
}

impl FromStr for VoiceMode {
    type Err = DrumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empty" => Ok(Self::Empty),
            "synth" => Ok(Self::Synth),
            "sample" => Ok(Self::Sample),
            _ => Err(DrumError::UnknownMode(s.to_string())),
        }
    }
}

/// Detune bounds in cents
pub const MAX_DETUNE_CENTS: f32 = 1200.0;

/// Clamp a detune value into range; non-finite input becomes 0
pub fn clamp_detune(cents: f32) -> f32 {
    if !cents.is_finite() {
        return 0.0;
    }
    cents.clamp(-MAX_DETUNE_CENTS, MAX_DETUNE_CENTS)
}

/// Frequency / playback-rate multiplier for a detune in cents.
///
/// Zero cents is exactly 1.0.
pub fn detune_ratio(cents: f32) -> f64 {
    let cents = clamp_detune(cents);
    if cents == 0.0 {
        return 1.0;
    }
    2.0_f64.powf(cents as f64 / 1200.0)
}

fn sanitize_unit(value: f32) -> f32 {
    if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 }
}

/// Fader level 0..100, mapped onto -60..0 dB with 0 as silence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Volume(f32);

impl Volume {
    pub const MAX: f32 = 100.0;
    const FLOOR_DB: f32 = -60.0;

    pub fn new(level: f32) -> Self {
        if !level.is_finite() {
            return Self(0.0);
        }
        Self(level.clamp(0.0, Self::MAX))
    }

    pub fn level(&self) -> f32 {
        self.0
    }

    pub fn db(&self) -> f32 {
        if self.0 <= 0.0 {
            return f32::NEG_INFINITY;
        }
        Self::FLOOR_DB + (self.0 / Self::MAX) * -Self::FLOOR_DB
    }

    pub fn gain(&self) -> f32 {
        if self.0 <= 0.0 {
            return 0.0;
        }
        10.0_f32.powf(self.db() / 20.0)
    }
}

impl Default for Volume {
    fn default() -> Self {
        // -6 dB
        Self(90.0)
    }
}

/// Note-length buckets for the tempo-synced delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DelayTime {
    Sixteenth,
    #[default]
    Eighth,
    DottedEighth,
    Quarter,
    Half,
}

impl DelayTime {
    pub const TABLE: [DelayTime; 5] = [
        DelayTime::Sixteenth,
        DelayTime::Eighth,
        DelayTime::DottedEighth,
        DelayTime::Quarter,
        DelayTime::Half,
    ];

    /// Quantize a continuous 0..1 control with `floor(v * 4)`
    pub fn from_control(value: f32) -> Self {
        let value = sanitize_unit(value);
        let index = ((value * (Self::TABLE.len() - 1) as f32).floor() as usize).min(Self::TABLE.len() - 1);
        Self::TABLE[index]
    }

    pub fn index(self) -> usize {
        Self::TABLE.iter().position(|t| *t == self).unwrap_or(0)
    }

    /// Length in quarter-note beats
    pub fn beats(self) -> f64 {
        match self {
            Self::Sixteenth => 0.25,
            Self::Eighth => 0.5,
            Self::DottedEighth => 0.75,
            Self::Quarter => 1.0,
            Self::Half => 2.0,
        }
    }

    pub fn seconds(self, bpm: f64) -> f64 {
        self.beats() * 60.0 / bpm
    }
}

/// Highest delay wet amount; the dry signal always dominates
pub const MAX_DELAY_WET: f32 = 0.5;
/// Highest delay feedback; stays below unity
pub const MAX_DELAY_FEEDBACK: f32 = 0.9;

/// Per-track delay controls, always held in their documented ranges
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DelaySettings {
    wet: f32,
    feedback: f32,
    time: DelayTime,
}

impl DelaySettings {
    /// Map a 0..1 mix amount onto 0..0.5 wet
    pub fn set_wet(&mut self, amount: f32) -> f32 {
        self.wet = sanitize_unit(amount) * MAX_DELAY_WET;
        self.wet
    }

    /// Feedback is `min(input * 0.9, 0.9)`
    pub fn set_feedback(&mut self, input: f32) -> f32 {
        let input = if input.is_finite() { input.max(0.0) } else { 0.0 };
        self.feedback = (input * MAX_DELAY_FEEDBACK).min(MAX_DELAY_FEEDBACK);
        self.feedback
    }

    pub fn set_time(&mut self, control: f32) -> DelayTime {
        self.time = DelayTime::from_control(control);
        self.time
    }

    pub fn wet(&self) -> f32 {
        self.wet
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn time(&self) -> DelayTime {
        self.time
    }
}

/// Snapshot of everything the engine knows about one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    pub track: TrackId,
    pub mode: VoiceMode,
    /// Whether a sample buffer is bound (it survives mode switches)
    pub has_sample: bool,
    pub detune_cents: f32,
    pub delay: DelaySettings,
    pub volume: Volume,
    pub muted: bool,
    pub soloed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_names_round_trip_through_from_str() {
        for track in TrackId::ALL {
            assert_eq!(track.name().parse::<TrackId>().unwrap(), track);
        }
        assert_eq!("HiHat".parse::<TrackId>().unwrap(), TrackId::HiHat);
        assert!("cowbell".parse::<TrackId>().is_err());
    }

    #[test]
    fn test_detune_ratio() {
        assert_eq!(detune_ratio(0.0), 1.0);
        assert!((detune_ratio(1200.0) - 2.0).abs() < 1e-12);
        assert!((detune_ratio(-1200.0) - 0.5).abs() < 1e-12);
        // clamped
        assert!((detune_ratio(5000.0) - 2.0).abs() < 1e-12);
        assert_eq!(detune_ratio(f32::NAN), 1.0);
    }

    #[test]
    fn test_delay_time_quantization() {
        assert_eq!(DelayTime::from_control(0.0), DelayTime::Sixteenth);
        assert_eq!(DelayTime::from_control(0.24), DelayTime::Sixteenth);
        assert_eq!(DelayTime::from_control(0.25), DelayTime::Eighth);
        assert_eq!(DelayTime::from_control(0.5), DelayTime::DottedEighth);
        assert_eq!(DelayTime::from_control(0.75), DelayTime::Quarter);
        assert_eq!(DelayTime::from_control(1.0), DelayTime::Half);
        assert_eq!(DelayTime::from_control(7.0), DelayTime::Half);
        assert_eq!(DelayTime::from_control(-1.0), DelayTime::Sixteenth);
        assert!((DelayTime::Quarter.seconds(120.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_delay_feedback_never_exceeds_limit() {
        let mut delay = DelaySettings::default();
        for i in 0..=1000 {
            let input = i as f32 / 1000.0;
            let fb = delay.set_feedback(input);
            assert!(fb <= MAX_DELAY_FEEDBACK);
            assert!(fb >= 0.0);
        }
        assert_eq!(delay.set_feedback(10.0), MAX_DELAY_FEEDBACK);
        assert_eq!(delay.set_feedback(-3.0), 0.0);
        assert_eq!(delay.set_feedback(f32::NAN), 0.0);
    }

    #[test]
    fn test_delay_wet_is_scaled_and_clamped() {
        let mut delay = DelaySettings::default();
        assert_eq!(delay.set_wet(1.0), 0.5);
        assert_eq!(delay.set_wet(0.5), 0.25);
        assert_eq!(delay.set_wet(3.0), 0.5);
        assert_eq!(delay.set_wet(-1.0), 0.0);
    }

    #[test]
    fn test_volume_mapping() {
        assert_eq!(Volume::new(0.0).db(), f32::NEG_INFINITY);
        assert_eq!(Volume::new(0.0).gain(), 0.0);
        assert_eq!(Volume::new(100.0).db(), 0.0);
        assert!((Volume::new(100.0).gain() - 1.0).abs() < 1e-6);
        assert!((Volume::default().db() + 6.0).abs() < 1e-4);
        assert_eq!(Volume::new(250.0).level(), 100.0);
    }
}
