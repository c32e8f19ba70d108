//! Transport state and the 16th-note step clock

use serde::{Deserialize, Serialize};

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;
pub const DEFAULT_BPM: f64 = 120.0;

/// Steps per quarter-note beat
const STEPS_PER_BEAT: f64 = 4.0;

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

/// One subdivision boundary handed to the sequencer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTick {
    /// Monotonic step counter since the transport was last stopped
    pub index: u64,
    /// Audio-clock time of the boundary in seconds
    pub time: f64,
    /// Timeline the tick belongs to
    pub generation: u64,
}

/// Transport controls and step position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transport {
    pub state: TransportState,
    /// Tempo in BPM
    bpm: f64,
    /// Next step to be handed out
    step_index: u64,
    /// Audio-clock time the next step is due
    next_step_time: f64,
    /// Bumped whenever a playing transport stops
    generation: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            state: TransportState::Stopped,
            bpm: DEFAULT_BPM,
            step_index: 0,
            next_step_time: 0.0,
            generation: 0,
        }
    }
}

impl Transport {
    pub fn new(bpm: f64) -> Self {
        let mut transport = Self::default();
        transport.set_tempo(bpm);
        transport
    }

    /// Start advancing; the first step is due at `now`. Returns false if already playing.
    pub fn start(&mut self, now: f64) -> bool {
        if self.is_playing() {
            return false;
        }
        self.state = TransportState::Playing;
        self.next_step_time = now;
        true
    }

    /// Halt and rewind to step 0. Returns true if the transport was playing.
    pub fn stop(&mut self) -> bool {
        let was_playing = self.is_playing();
        self.state = TransportState::Stopped;
        self.step_index = 0;
        if was_playing {
            self.generation += 1;
        }
        was_playing
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Change tempo without moving position; returns the applied value
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        if bpm.is_finite() {
            self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        }
        self.bpm
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Duration of one 16th note
    pub fn seconds_per_step(&self) -> f64 {
        60.0 / self.bpm / STEPS_PER_BEAT
    }

    /// Samples per beat at current tempo
    pub fn samples_per_beat(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 * 60.0 / self.bpm
    }

    /// Every step whose boundary falls before `until`, in order
    pub fn due_steps(&mut self, until: f64) -> Vec<StepTick> {
        let mut ticks = Vec::new();
        if !self.is_playing() {
            return ticks;
        }
        while self.next_step_time < until {
            ticks.push(StepTick {
                index: self.step_index,
                time: self.next_step_time,
                generation: self.generation,
            });
            self.step_index += 1;
            self.next_step_time += self.seconds_per_step();
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_resets_and_is_idempotent() {
        let mut transport = Transport::default();
        transport.start(0.0);
        assert_eq!(transport.due_steps(1.0).len(), 8);
        assert!(transport.stop());
        assert_eq!(transport.step_index(), 0);
        let generation = transport.generation();
        assert!(!transport.stop());
        assert_eq!(transport.step_index(), 0);
        assert_eq!(transport.generation(), generation);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut transport = Transport::default();
        assert!(transport.start(1.0));
        assert!(!transport.start(5.0));
        let ticks = transport.due_steps(1.1);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].time, 1.0);
    }

    #[test]
    fn test_due_steps_at_120_bpm() {
        let mut transport = Transport::new(120.0);
        transport.start(0.0);
        let ticks = transport.due_steps(0.5);
        let times: Vec<f64> = ticks.iter().map(|t| t.time).collect();
        assert_eq!(ticks.len(), 4);
        for (i, time) in times.iter().enumerate() {
            assert!((time - i as f64 * 0.125).abs() < 1e-9);
        }
        // nothing is handed out twice
        assert!(transport.due_steps(0.5).is_empty());
        assert_eq!(transport.due_steps(0.6)[0].index, 4);
    }

    #[test]
    fn test_stopped_transport_yields_nothing() {
        let mut transport = Transport::default();
        assert!(transport.due_steps(10.0).is_empty());
    }

    #[test]
    fn test_tempo_is_clamped() {
        let mut transport = Transport::default();
        assert_eq!(transport.set_tempo(1000.0), MAX_BPM);
        assert_eq!(transport.set_tempo(0.0), MIN_BPM);
        assert_eq!(transport.set_tempo(f64::NAN), MIN_BPM);
        assert_eq!(transport.set_tempo(140.0), 140.0);
    }

    #[test]
    fn test_tempo_change_keeps_position() {
        let mut transport = Transport::new(120.0);
        transport.start(0.0);
        transport.due_steps(0.3);
        let index = transport.step_index();
        transport.set_tempo(60.0);
        assert_eq!(transport.step_index(), index);
        let ticks = transport.due_steps(1.0);
        assert!((ticks[1].time - ticks[0].time - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_stop_bumps_generation() {
        let mut transport = Transport::default();
        transport.start(0.0);
        let before = transport.due_steps(0.1)[0].generation;
        transport.stop();
        transport.start(2.0);
        assert_eq!(transport.due_steps(2.1)[0].generation, before + 1);
    }
}
