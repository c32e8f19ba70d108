//! Procedural drum generators, one archetype per drum track

use std::f64::consts::TAU;
use std::fmt;

use drummimasin_core::TrackId;
use fundsp::hacker::*;

/// Attack / decay / sustain / release times in seconds, sustain as a level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrShape {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Amplitude envelope with an optional automatic gate
#[derive(Debug, Clone)]
pub struct Adsr {
    shape: AdsrShape,
    stage: Stage,
    level: f64,
    peak: f64,
    elapsed: f64,
    gate: Option<f64>,
}

impl Adsr {
    const FLOOR: f64 = 1e-4;

    pub fn new(shape: AdsrShape) -> Self {
        Self {
            shape,
            stage: Stage::Idle,
            level: 0.0,
            peak: 1.0,
            elapsed: 0.0,
            gate: None,
        }
    }

    /// Restart from the current level; release begins `gate` seconds later if set
    pub fn trigger(&mut self, peak: f64, gate: Option<f64>) {
        self.peak = peak.max(0.0);
        self.stage = Stage::Attack;
        self.elapsed = 0.0;
        self.gate = gate;
    }

    pub fn release(&mut self) {
        if self.stage != Stage::Idle {
            self.stage = Stage::Release;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }

    pub fn tick(&mut self, dt: f64) -> f64 {
        match self.stage {
            Stage::Idle => return 0.0,
            Stage::Attack => {
                self.level += self.peak * dt / self.shape.attack.max(dt);
                if self.level >= self.peak {
                    self.level = self.peak;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                let target = self.shape.sustain * self.peak;
                let tau = (self.shape.decay / 4.0).max(1e-4);
                self.level = target + (self.level - target) * (-dt / tau).exp();
                if (self.level - target).abs() < Self::FLOOR * self.peak.max(Self::FLOOR) {
                    self.level = target;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {}
            Stage::Release => {
                let tau = (self.shape.release / 4.0).max(1e-4);
                self.level *= (-dt / tau).exp();
                if self.level < Self::FLOOR {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }

        self.elapsed += dt;
        if let Some(gate) = self.gate {
            if self.elapsed >= gate && matches!(self.stage, Stage::Attack | Stage::Decay | Stage::Sustain) {
                self.stage = Stage::Release;
            }
        }
        self.level
    }
}

/// Which generator a drum track uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthArchetype {
    Kick,
    Snare,
    HiHat,
    Resonator,
}

impl SynthArchetype {
    /// `None` for tracks without a synthesized sound (live)
    pub fn for_track(track: TrackId) -> Option<Self> {
        match track {
            TrackId::Kick => Some(Self::Kick),
            TrackId::Snare => Some(Self::Snare),
            TrackId::HiHat => Some(Self::HiHat),
            TrackId::Resonator => Some(Self::Resonator),
            TrackId::Live => None,
        }
    }
}

// Kick: membrane at C1 swept down from 10x over 50 ms
const KICK_FREQ: f64 = 32.703;
const KICK_SWEEP: f64 = 10.0;
const KICK_PITCH_DECAY: f64 = 0.05;
const KICK_GATE: f64 = 0.25;
const KICK_ENV: AdsrShape = AdsrShape { attack: 0.001, decay: 0.4, sustain: 0.01, release: 1.4 };

// Snare: pink noise snap plus a triangle membrane at G2
const SNARE_FREQ: f64 = 98.0;
const SNARE_SWEEP: f64 = 2.0;
const SNARE_PITCH_DECAY: f64 = 0.01;
const SNARE_GATE: f64 = 0.25;
const SNARE_NOISE_ENV: AdsrShape = AdsrShape { attack: 0.001, decay: 0.2, sustain: 0.0, release: 0.2 };
const SNARE_BODY_ENV: AdsrShape = AdsrShape { attack: 0.001, decay: 0.3, sustain: 0.0, release: 0.4 };

// Hi-hat: inharmonic square cluster, high-passed
const HAT_FREQS: [f64; 6] = [205.3, 304.4, 369.6, 522.7, 540.0, 800.0];
const HAT_CUTOFF: f32 = 3000.0;
const HAT_GATE: f64 = 0.0625;
const HAT_OUTPUT: f64 = 0.8;
const HAT_ENV: AdsrShape = AdsrShape { attack: 0.001, decay: 0.1, sustain: 0.0, release: 0.01 };

// Resonator: narrow pulse into a feedback comb
const RES_FREQ: f64 = 60.0;
const RES_WIDTH: f64 = 0.2;
const RES_GATE: f64 = 0.1;
const RES_ENV: AdsrShape = AdsrShape { attack: 0.005, decay: 0.3, sustain: 0.1, release: 0.8 };
const COMB_DELAY_SECS: f32 = 0.003;
const COMB_RESONANCE: f32 = 0.8;
const RES_OUTPUT: f32 = 0.3;

/// Paul Kellet's economy pink filter
#[derive(Debug, Clone, Default)]
struct PinkNoise {
    b0: f64,
    b1: f64,
    b2: f64,
}

impl PinkNoise {
    fn next(&mut self) -> f64 {
        let white = fastrand::f64() * 2.0 - 1.0;
        self.b0 = 0.99765 * self.b0 + white * 0.0990460;
        self.b1 = 0.96300 * self.b1 + white * 0.2965164;
        self.b2 = 0.57000 * self.b2 + white * 1.0526913;
        (self.b0 + self.b1 + self.b2 + white * 0.1848) * 0.25
    }
}

/// `y[n] = x[n] + resonance * y[n - d]`
#[derive(Debug, Clone)]
struct FeedbackComb {
    buffer: Vec<f32>,
    pos: usize,
    resonance: f32,
}

impl FeedbackComb {
    fn new(delay_secs: f32, resonance: f32, sample_rate: f32) -> Self {
        let len = Ord::max((delay_secs * sample_rate) as usize, 1);
        Self { buffer: vec![0.0; len], pos: 0, resonance }
    }

    fn tick(&mut self, input: f32) -> f32 {
        let out = input + self.resonance * self.buffer[self.pos];
        self.buffer[self.pos] = out;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }

    fn peak(&self) -> f32 {
        self.buffer.iter().fold(0.0, |m, s| m.max(s.abs()))
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Exponential sweep from `base * sweep` down to `base` over `decay` seconds
fn swept_freq(base: f64, sweep: f64, decay: f64, t: f64) -> f64 {
    if t >= decay {
        return base;
    }
    base * sweep * (1.0 / sweep).powf(t / decay)
}

fn triangle(phase: f64) -> f64 {
    4.0 * (phase.fract() - 0.5).abs() - 1.0
}

fn square(phase: f64) -> f64 {
    if phase.fract() < 0.5 { 1.0 } else { -1.0 }
}

/// One monophonic drum generator; retriggering restarts the envelopes
pub struct DrumSynth {
    archetype: SynthArchetype,
    sample_rate: f32,
    pitch_ratio: f64,
    velocity: f32,
    elapsed: f64,
    phase: f64,
    hat_phases: [f64; 6],
    amp_env: Adsr,
    noise_env: Adsr,
    pink: PinkNoise,
    highpass: An<FixedSvf<f64, HighpassMode<f64>>>,
    comb: FeedbackComb,
}

impl fmt::Debug for DrumSynth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrumSynth")
            .field("archetype", &self.archetype)
            .field("pitch_ratio", &self.pitch_ratio)
            .field("active", &self.is_active())
            .finish()
    }
}

impl DrumSynth {
    pub fn new(archetype: SynthArchetype, sample_rate: f32) -> Self {
        let (amp_shape, noise_shape) = match archetype {
            SynthArchetype::Kick => (KICK_ENV, KICK_ENV),
            SynthArchetype::Snare => (SNARE_BODY_ENV, SNARE_NOISE_ENV),
            SynthArchetype::HiHat => (HAT_ENV, HAT_ENV),
            SynthArchetype::Resonator => (RES_ENV, RES_ENV),
        };
        let mut highpass = highpass_hz(HAT_CUTOFF, 0.707);
        highpass.set_sample_rate(sample_rate as f64);

        Self {
            archetype,
            sample_rate,
            pitch_ratio: 1.0,
            velocity: 1.0,
            elapsed: 0.0,
            phase: 0.0,
            hat_phases: [0.0; 6],
            amp_env: Adsr::new(amp_shape),
            noise_env: Adsr::new(noise_shape),
            pink: PinkNoise::default(),
            highpass,
            comb: FeedbackComb::new(COMB_DELAY_SECS, COMB_RESONANCE, sample_rate),
        }
    }

    pub fn archetype(&self) -> SynthArchetype {
        self.archetype
    }

    /// Oscillator frequency multiplier from detune
    pub fn set_pitch_ratio(&mut self, ratio: f64) {
        self.pitch_ratio = ratio;
    }

    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    pub fn trigger(&mut self, velocity: f32) {
        self.velocity = velocity.clamp(0.0, 1.0);
        self.elapsed = 0.0;
        match self.archetype {
            SynthArchetype::Kick => {
                self.phase = 0.0;
                self.amp_env.trigger(1.0, Some(KICK_GATE));
            }
            SynthArchetype::Snare => {
                self.phase = 0.0;
                self.amp_env.trigger(1.0, Some(SNARE_GATE));
                self.noise_env.trigger(1.0, Some(SNARE_GATE));
            }
            SynthArchetype::HiHat => {
                self.amp_env.trigger(1.0, Some(HAT_GATE));
            }
            SynthArchetype::Resonator => {
                self.amp_env.trigger(1.0, Some(RES_GATE));
            }
        }
    }

    pub fn is_active(&self) -> bool {
        match self.archetype {
            SynthArchetype::Snare => !self.amp_env.is_idle() || !self.noise_env.is_idle(),
            SynthArchetype::Resonator => !self.amp_env.is_idle() || self.comb.peak() > 1e-5,
            SynthArchetype::Kick | SynthArchetype::HiHat => !self.amp_env.is_idle(),
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        if !self.is_active() {
            return 0.0;
        }
        let dt = 1.0 / self.sample_rate as f64;
        let t = self.elapsed;
        self.elapsed += dt;

        let sample = match self.archetype {
            SynthArchetype::Kick => self.tick_kick(dt, t),
            SynthArchetype::Snare => self.tick_snare(dt, t),
            SynthArchetype::HiHat => self.tick_hat(dt),
            SynthArchetype::Resonator => self.tick_resonator(dt),
        };
        sample * self.velocity
    }

    fn tick_kick(&mut self, dt: f64, t: f64) -> f32 {
        let freq = swept_freq(KICK_FREQ * self.pitch_ratio, KICK_SWEEP, KICK_PITCH_DECAY, t);
        self.phase += freq * dt;
        let osc = (self.phase * TAU).sin();
        (osc * self.amp_env.tick(dt)) as f32
    }

    fn tick_snare(&mut self, dt: f64, t: f64) -> f32 {
        let freq = swept_freq(SNARE_FREQ * self.pitch_ratio, SNARE_SWEEP, SNARE_PITCH_DECAY, t);
        self.phase += freq * dt;
        let body = triangle(self.phase) * self.amp_env.tick(dt);
        let snap = self.pink.next() * self.noise_env.tick(dt);
        (body * 0.5 + snap * 0.5) as f32
    }

    fn tick_hat(&mut self, dt: f64) -> f32 {
        let mut cluster = 0.0;
        for (phase, freq) in self.hat_phases.iter_mut().zip(HAT_FREQS) {
            *phase += freq * self.pitch_ratio * dt;
            cluster += square(*phase);
        }
        let cluster = (cluster / HAT_FREQS.len() as f64) as f32;
        let filtered = self.highpass.tick(&Frame::from([cluster]))[0];
        (filtered as f64 * self.amp_env.tick(dt) * HAT_OUTPUT) as f32
    }

    fn tick_resonator(&mut self, dt: f64) -> f32 {
        self.phase += RES_FREQ * self.pitch_ratio * dt;
        // centre the pulse so the comb does not build up DC
        let pulse = (if self.phase.fract() < RES_WIDTH { 1.0 } else { -1.0 }) - (2.0 * RES_WIDTH - 1.0);
        let excited = (pulse * self.amp_env.tick(dt)) as f32;
        let out = self.comb.tick(excited);
        if self.amp_env.is_idle() && self.comb.peak() <= 1e-5 {
            self.comb.clear();
        }
        out * RES_OUTPUT
    }
}
