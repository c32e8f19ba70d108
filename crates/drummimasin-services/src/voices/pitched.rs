//! Keyboard-playable instrument: one voice per held note

use std::collections::HashMap;
use std::f64::consts::TAU;

use super::drum_synth::{Adsr, AdsrShape};
use super::sample_player::SampleBuffer;

/// MIDI note the piano sample is recorded at (C4)
pub const PIANO_BASE_NOTE: u8 = 60;

const TONE_ENV: AdsrShape = AdsrShape { attack: 0.005, decay: 0.3, sustain: 0.4, release: 0.6 };
const SAMPLE_ENV: AdsrShape = AdsrShape { attack: 0.002, decay: 0.0, sustain: 1.0, release: 0.3 };
const OUTPUT_GAIN: f32 = 0.5;

pub fn note_to_hz(note: u8) -> f64 {
    440.0 * 2.0_f64.powf((note as f64 - 69.0) / 12.0)
}

#[derive(Debug, Clone)]
enum NoteSource {
    Tone { phase: f64, freq: f64 },
    Sample { buffer: SampleBuffer, position: f64, speed: f64 },
}

#[derive(Debug, Clone)]
struct NoteVoice {
    source: NoteSource,
    env: Adsr,
    velocity: f32,
}

impl NoteVoice {
    fn tick(&mut self, dt: f64) -> Option<f32> {
        let raw = match &mut self.source {
            NoteSource::Tone { phase, freq } => {
                *phase += *freq * dt;
                // triangle
                4.0 * (phase.fract() - 0.5).abs() - 1.0
            }
            NoteSource::Sample { buffer, position, speed } => {
                let data = buffer.data();
                let idx = *position as usize;
                if idx + 1 >= data.len() {
                    return None;
                }
                let frac = *position - idx as f64;
                *position += *speed;
                data[idx] as f64 + frac * (data[idx + 1] - data[idx]) as f64
            }
        };
        let level = self.env.tick(dt);
        if self.env.is_idle() {
            return None;
        }
        Some((raw * level) as f32 * self.velocity)
    }
}

/// Piano-style instrument with a single active-note map
#[derive(Debug)]
pub struct PitchedInstrument {
    sample: Option<SampleBuffer>,
    notes: HashMap<u8, NoteVoice>,
    /// Released notes still ringing out
    tails: Vec<NoteVoice>,
    sample_rate: f32,
}

impl PitchedInstrument {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample: None,
            notes: HashMap::new(),
            tails: Vec::new(),
            sample_rate,
        }
    }

    pub fn set_sample(&mut self, buffer: Option<SampleBuffer>) {
        self.sample = buffer;
    }

    pub fn has_sample(&self) -> bool {
        self.sample.is_some()
    }

    pub fn attack(&mut self, note: u8, velocity: f32) {
        let source = match &self.sample {
            Some(buffer) => NoteSource::Sample {
                buffer: buffer.clone(),
                position: 0.0,
                speed: 2.0_f64.powf((note as f64 - PIANO_BASE_NOTE as f64) / 12.0),
            },
            None => NoteSource::Tone { phase: 0.0, freq: note_to_hz(note) },
        };
        let shape = if self.sample.is_some() { SAMPLE_ENV } else { TONE_ENV };
        let mut env = Adsr::new(shape);
        env.trigger(1.0, None);
        let voice = NoteVoice { source, env, velocity: velocity.clamp(0.0, 1.0) };

        // a retriggered note lets its previous voice ring out
        if let Some(mut previous) = self.notes.insert(note, voice) {
            previous.env.release();
            self.tails.push(previous);
        }
    }

    pub fn release(&mut self, note: u8) {
        if let Some(mut voice) = self.notes.remove(&note) {
            voice.env.release();
            self.tails.push(voice);
        }
    }

    pub fn release_all(&mut self) {
        let held: Vec<u8> = self.notes.keys().copied().collect();
        for note in held {
            self.release(note);
        }
    }

    pub fn active_notes(&self) -> usize {
        self.notes.len()
    }

    pub fn is_active(&self) -> bool {
        !self.notes.is_empty() || !self.tails.is_empty()
    }

    pub fn next_sample(&mut self) -> f32 {
        let dt = 1.0 / self.sample_rate as f64;
        let mut mix = 0.0;
        let mut finished = Vec::new();
        for (note, voice) in self.notes.iter_mut() {
            match voice.tick(dt) {
                Some(s) => mix += s,
                None => finished.push(*note),
            }
        }
        for note in finished {
            self.notes.remove(&note);
        }
        self.tails.retain_mut(|voice| match voice.tick(dt) {
            Some(s) => {
                mix += s;
                true
            }
            None => false,
        });
        mix * OUTPUT_GAIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_note_frequencies() {
        assert!((note_to_hz(69) - 440.0).abs() < 1e-9);
        assert!((note_to_hz(60) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn test_one_voice_per_note() {
        let mut piano = PitchedInstrument::new(SR);
        piano.attack(60, 1.0);
        piano.attack(60, 0.5);
        piano.attack(64, 1.0);
        assert_eq!(piano.active_notes(), 2);
        piano.release(60);
        assert_eq!(piano.active_notes(), 1);
        piano.release(99);
        assert_eq!(piano.active_notes(), 1);
    }

    #[test]
    fn test_tone_sounds_until_released() {
        let mut piano = PitchedInstrument::new(SR);
        piano.attack(57, 1.0);
        let held: f32 = (0..48000).map(|_| piano.next_sample().abs()).fold(0.0, f32::max);
        assert!(held > 0.1);
        piano.release_all();
        for _ in 0..(SR as usize * 2) {
            piano.next_sample();
        }
        assert!(!piano.is_active());
    }

    #[test]
    fn test_sample_is_repitched_from_c4() {
        let mut piano = PitchedInstrument::new(SR);
        piano.set_sample(Some(SampleBuffer::from_samples("c4", vec![0.8; 4800], 48000)));
        // an octave up plays the buffer twice as fast
        piano.attack(72, 1.0);
        let mut frames = 0;
        while piano.is_active() && frames < 10000 {
            piano.next_sample();
            frames += 1;
        }
        assert!((2398..=2402).contains(&frames), "frames {}", frames);
    }
}
