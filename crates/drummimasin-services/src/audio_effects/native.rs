//! Native audio effects using fundsp

use std::fmt;

use drummimasin_core::Volume;
use drummimasin_core::track::{MAX_DELAY_FEEDBACK, MAX_DELAY_WET};
use fundsp::hacker::*;

use super::{AudioEffect, EffectParam};

/// Track fader: 0..100 level mapped to -60..0 dB, silent at 0
#[derive(Debug)]
pub struct GainEffect {
    volume: Volume,
    gain_linear: f32,
}

impl GainEffect {
    pub fn new(level: f32) -> Self {
        let volume = Volume::new(level);
        Self {
            volume,
            gain_linear: volume.gain(),
        }
    }
}

impl AudioEffect for GainEffect {
    fn name(&self) -> &'static str { "Gain" }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample *= self.gain_linear;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if name != "volume" {
            return;
        }
        self.volume = Volume::new(value);
        self.gain_linear = self.volume.gain();
    }

    fn params(&self) -> Vec<EffectParam> {
        vec![EffectParam::new("volume", self.volume.level(), 0.0..=Volume::MAX, "")]
    }
}

/// Feedback delay whose time is set in seconds by the tempo-synced caller.
///
/// In ping-pong mode a second line takes each echo of the first one delay
/// later and feeds it back; both lines are summed to the mono output, so
/// echoes arrive in pairs and feedback is applied once per pair.
pub struct DelayEffect {
    time_secs: f32,
    feedback: f32,
    wet: f32,
    ping_pong: bool,
    buffer: Vec<f32>,
    cross: Vec<f32>,
    write_pos: usize,
    sample_rate: f32,
}

impl DelayEffect {
    /// Longest delay: a half note at 20 BPM
    pub const MAX_TIME_SECS: f32 = 6.0;

    pub fn new(time_secs: f32, feedback: f32, wet: f32, sample_rate: f32) -> Self {
        let mut effect = Self {
            time_secs: 0.0,
            feedback: 0.0,
            wet: 0.0,
            ping_pong: false,
            buffer: Vec::new(),
            cross: Vec::new(),
            write_pos: 0,
            sample_rate,
        };
        effect.allocate();
        effect.set_param("time", time_secs);
        effect.set_param("feedback", feedback);
        effect.set_param("wet", wet);
        effect
    }

    fn allocate(&mut self) {
        let max_samples = (Self::MAX_TIME_SECS * self.sample_rate) as usize + 2;
        self.buffer = vec![0.0; max_samples];
        self.cross = vec![0.0; max_samples];
        self.write_pos = 0;
    }

    fn delay_samples(&self) -> usize {
        ((self.time_secs * self.sample_rate) as usize).clamp(1, self.buffer.len() - 1)
    }
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

impl fmt::Debug for DelayEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayEffect")
            .field("time_secs", &self.time_secs)
            .field("feedback", &self.feedback)
            .field("wet", &self.wet)
            .field("ping_pong", &self.ping_pong)
            .finish()
    }
}

impl AudioEffect for DelayEffect {
    fn name(&self) -> &'static str { "Delay" }

    fn process(&mut self, samples: &mut [f32]) {
        let delay_samples = self.delay_samples();
        let len = self.buffer.len();

        for sample in samples.iter_mut() {
            let read_pos = (self.write_pos + len - delay_samples) % len;
            let first = self.buffer[read_pos];
            let delayed = if self.ping_pong {
                let second = self.cross[read_pos];
                self.buffer[self.write_pos] = *sample + second * self.feedback;
                self.cross[self.write_pos] = first;
                first + second
            } else {
                self.buffer[self.write_pos] = *sample + first * self.feedback;
                first
            };
            self.write_pos = (self.write_pos + 1) % len;
            *sample = *sample * (1.0 - self.wet) + delayed * self.wet;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        let value = finite_or_zero(value);
        match name {
            "time" => self.time_secs = value.clamp(0.0, Self::MAX_TIME_SECS),
            "feedback" => self.feedback = value.clamp(0.0, MAX_DELAY_FEEDBACK),
            "wet" => self.wet = value.clamp(0.0, MAX_DELAY_WET),
            "ping_pong" => {
                let on = value >= 0.5;
                if on != self.ping_pong {
                    self.cross.fill(0.0);
                    self.ping_pong = on;
                }
            }
            _ => {}
        }
    }

    fn params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("time", self.time_secs, 0.0..=Self::MAX_TIME_SECS, "s"),
            EffectParam::new("feedback", self.feedback, 0.0..=MAX_DELAY_FEEDBACK, ""),
            EffectParam::new("wet", self.wet, 0.0..=MAX_DELAY_WET, ""),
            EffectParam::new("ping_pong", if self.ping_pong { 1.0 } else { 0.0 }, 0.0..=1.0, ""),
        ]
    }
}

/// Sparse noise impulse response with an exponential tail
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    taps: Vec<(usize, f32)>,
    length: usize,
}

impl ImpulseResponse {
    const TAPS_PER_SECOND: f32 = 300.0;

    /// Generate once; the tail falls 60 dB over `decay_secs`
    pub fn generate(decay_secs: f32, sample_rate: f32, seed: u64) -> Self {
        let decay_secs = if decay_secs.is_finite() { decay_secs.max(0.01) } else { 4.0 };
        let length = Ord::max((decay_secs * sample_rate) as usize, 1);
        let spacing = Ord::max((sample_rate / Self::TAPS_PER_SECOND) as usize, 1);
        let mut rng = fastrand::Rng::with_seed(seed);

        let mut taps = Vec::with_capacity(length / spacing + 1);
        let mut slot = 0;
        while slot < length {
            let offset = Ord::min(slot + rng.usize(..spacing), length - 1);
            let t = offset as f32 / sample_rate;
            let sign = if rng.bool() { 1.0 } else { -1.0 };
            // 60 dB of decay is a factor of e^-6.9
            let gain = sign * (-6.9 * t / decay_secs).exp();
            taps.push((offset, gain));
            slot += spacing;
        }

        let energy: f32 = taps.iter().map(|(_, g)| g * g).sum();
        if energy > 0.0 {
            let norm = 1.0 / energy.sqrt();
            for (_, gain) in &mut taps {
                *gain *= norm;
            }
        }

        Self { taps, length }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn taps(&self) -> &[(usize, f32)] {
        &self.taps
    }
}

/// Convolution reverb over a generated impulse response
pub struct ReverbEffect {
    decay_secs: f32,
    wet: f32,
    impulse: ImpulseResponse,
    history: Vec<f32>,
    pos: usize,
}

impl ReverbEffect {
    pub fn new(decay_secs: f32, wet: f32, sample_rate: f32, seed: u64) -> Self {
        let impulse = ImpulseResponse::generate(decay_secs, sample_rate, seed);
        Self {
            decay_secs,
            wet: finite_or_zero(wet).clamp(0.0, 1.0),
            history: vec![0.0; impulse.len()],
            impulse,
            pos: 0,
        }
    }
}

impl fmt::Debug for ReverbEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverbEffect")
            .field("decay_secs", &self.decay_secs)
            .field("wet", &self.wet)
            .field("taps", &self.impulse.taps.len())
            .finish()
    }
}

impl AudioEffect for ReverbEffect {
    fn name(&self) -> &'static str { "Reverb" }

    fn process(&mut self, samples: &mut [f32]) {
        let len = self.history.len();
        for sample in samples.iter_mut() {
            let dry = *sample;
            self.history[self.pos] = dry;

            if self.wet > 0.0 {
                let mut tail = 0.0;
                for &(offset, gain) in &self.impulse.taps {
                    tail += self.history[(self.pos + len - offset) % len] * gain;
                }
                *sample = dry * (1.0 - self.wet) + tail * self.wet;
            }

            self.pos = (self.pos + 1) % len;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if name == "wet" {
            self.wet = finite_or_zero(value).clamp(0.0, 1.0);
        }
    }

    fn params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("decay", self.decay_secs, 0.01..=10.0, "s"),
            EffectParam::new("wet", self.wet, 0.0..=1.0, ""),
        ]
    }
}

/// Feed-forward compressor with a peak envelope follower
pub struct CompressorEffect {
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
    sample_rate: f32,
}

impl CompressorEffect {
    pub fn new(threshold_db: f32, ratio: f32, sample_rate: f32) -> Self {
        let mut effect = Self {
            threshold_db,
            ratio: ratio.max(1.0),
            attack_ms: 3.0,
            release_ms: 250.0,
            envelope: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            sample_rate,
        };
        effect.update_coeffs();
        effect
    }

    fn update_coeffs(&mut self) {
        let coeff = |ms: f32| (-1.0 / (ms.max(0.01) / 1000.0 * self.sample_rate)).exp();
        self.attack_coeff = coeff(self.attack_ms);
        self.release_coeff = coeff(self.release_ms);
    }

    fn gain_for(&self, level: f32) -> f32 {
        if level <= 0.0 {
            return 1.0;
        }
        let over = amp_db(level) - self.threshold_db;
        if over <= 0.0 {
            return 1.0;
        }
        db_amp(-over * (1.0 - 1.0 / self.ratio))
    }
}

impl fmt::Debug for CompressorEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressorEffect")
            .field("threshold_db", &self.threshold_db)
            .field("ratio", &self.ratio)
            .field("attack_ms", &self.attack_ms)
            .field("release_ms", &self.release_ms)
            .finish()
    }
}

impl AudioEffect for CompressorEffect {
    fn name(&self) -> &'static str { "Compressor" }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let level = sample.abs();
            let coeff = if level > self.envelope { self.attack_coeff } else { self.release_coeff };
            self.envelope = level + coeff * (self.envelope - level);
            *sample *= self.gain_for(self.envelope);
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        let value = finite_or_zero(value);
        match name {
            "threshold" => self.threshold_db = value.clamp(-60.0, 0.0),
            "ratio" => self.ratio = value.clamp(1.0, 20.0),
            "attack" => {
                self.attack_ms = value.clamp(0.1, 100.0);
                self.update_coeffs();
            }
            "release" => {
                self.release_ms = value.clamp(10.0, 1000.0);
                self.update_coeffs();
            }
            _ => {}
        }
    }

    fn params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("threshold", self.threshold_db, -60.0..=0.0, "dB"),
            EffectParam::new("ratio", self.ratio, 1.0..=20.0, ":1"),
            EffectParam::new("attack", self.attack_ms, 0.1..=100.0, "ms"),
            EffectParam::new("release", self.release_ms, 10.0..=1000.0, "ms"),
        ]
    }
}

/// Brickwall limiter using fundsp's look-ahead limiter, scaled to a ceiling
pub struct LimiterEffect {
    ceiling_db: f32,
    limiter: An<Limiter<U1>>,
}

impl LimiterEffect {
    const ATTACK_S: f32 = 0.005;
    const RELEASE_S: f32 = 0.1;

    pub fn new(ceiling_db: f32, sample_rate: f32) -> Self {
        let mut limiter = limiter(Self::ATTACK_S, Self::RELEASE_S);
        limiter.set_sample_rate(sample_rate as f64);
        Self { ceiling_db, limiter }
    }
}

impl fmt::Debug for LimiterEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimiterEffect")
            .field("ceiling_db", &self.ceiling_db)
            .finish()
    }
}

impl AudioEffect for LimiterEffect {
    fn name(&self) -> &'static str { "Limiter" }

    fn process(&mut self, samples: &mut [f32]) {
        let ceiling = db_amp(self.ceiling_db);
        for sample in samples.iter_mut() {
            let input = Frame::from([*sample / ceiling]);
            let output = self.limiter.tick(&input);
            *sample = (output[0] * ceiling).clamp(-ceiling, ceiling);
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if name == "ceiling" {
            self.ceiling_db = finite_or_zero(value).clamp(-24.0, 0.0);
        }
    }

    fn params(&self) -> Vec<EffectParam> {
        vec![EffectParam::new("ceiling", self.ceiling_db, -24.0..=0.0, "dB")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_gain_follows_volume_curve() {
        let mut gain = GainEffect::new(100.0);
        let mut block = [0.5_f32; 4];
        gain.process(&mut block);
        assert!((block[0] - 0.5).abs() < 1e-6);

        gain.set_param("volume", 0.0);
        gain.process(&mut block);
        assert_eq!(block, [0.0; 4]);
    }

    #[test]
    fn test_delay_echo_lands_after_delay_time() {
        let mut delay = DelayEffect::new(0.01, 0.0, 0.5, SR);
        let mut block = vec![0.0_f32; 1000];
        block[0] = 1.0;
        delay.process(&mut block);
        // dry is attenuated by (1 - wet)
        assert!((block[0] - 0.5).abs() < 1e-6);
        assert!((block[480] - 0.5).abs() < 1e-6);
        assert!(block[1..480].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_ping_pong_echoes_arrive_in_pairs() {
        let impulse = || {
            let mut block = vec![0.0_f32; 2000];
            block[0] = 1.0;
            block
        };

        let mut mono = DelayEffect::new(0.01, 0.5, 0.5, SR);
        let mut mono_out = impulse();
        mono.process(&mut mono_out);

        let mut pp = DelayEffect::new(0.01, 0.5, 0.5, SR);
        pp.set_param("ping_pong", 1.0);
        assert_eq!(pp.param("ping_pong"), Some(1.0));
        let mut pp_out = impulse();
        pp.process(&mut pp_out);

        // first echo is the same in both modes
        assert!((mono_out[480] - 0.5).abs() < 1e-6);
        assert!((pp_out[480] - 0.5).abs() < 1e-6);
        // mono decays by the feedback on every echo
        assert!((mono_out[960] - 0.25).abs() < 1e-6);
        assert!((mono_out[1440] - 0.125).abs() < 1e-6);
        // ping-pong repeats the echo on the other line, then decays
        assert!((pp_out[960] - 0.5).abs() < 1e-6);
        assert!((pp_out[1440] - 0.25).abs() < 1e-6);
        assert!((pp_out[1920] - 0.25).abs() < 1e-6);
        assert!(pp_out[481..960].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_delay_params_are_clamped() {
        let mut delay = DelayEffect::new(0.25, 0.0, 0.0, SR);
        delay.set_param("feedback", 5.0);
        delay.set_param("wet", 2.0);
        delay.set_param("time", 100.0);
        assert_eq!(delay.param("feedback"), Some(MAX_DELAY_FEEDBACK));
        assert_eq!(delay.param("wet"), Some(MAX_DELAY_WET));
        assert_eq!(delay.param("time"), Some(DelayEffect::MAX_TIME_SECS));
        delay.set_param("wet", f32::NAN);
        assert_eq!(delay.param("wet"), Some(0.0));
    }

    #[test]
    fn test_impulse_response_decays() {
        let ir = ImpulseResponse::generate(4.0, SR, 1);
        assert_eq!(ir.len(), 192000);
        assert!(!ir.is_empty());
        assert!(ir.taps().iter().all(|(offset, _)| *offset < ir.len()));
        let early: f32 = ir.taps()[..50].iter().map(|(_, g)| g.abs()).sum();
        let late: f32 = ir.taps()[ir.taps().len() - 50..].iter().map(|(_, g)| g.abs()).sum();
        assert!(early > late * 100.0);
        // same seed, same response
        let again = ImpulseResponse::generate(4.0, SR, 1);
        assert_eq!(ir.taps(), again.taps());
    }

    #[test]
    fn test_reverb_dry_when_wet_is_zero() {
        let mut reverb = ReverbEffect::new(1.0, 0.0, SR, 3);
        let mut block: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin()).collect();
        let original = block.clone();
        reverb.process(&mut block);
        assert_eq!(block, original);

        reverb.set_param("wet", 1.0);
        let mut impulse = vec![0.0_f32; 4800];
        impulse[0] = 1.0;
        reverb.process(&mut impulse);
        assert!(impulse[1..].iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn test_compressor_reduces_above_threshold() {
        let mut comp = CompressorEffect::new(-30.0, 3.0, SR);
        let mut loud = vec![1.0_f32; 24000];
        comp.process(&mut loud);
        // 30 dB over at 3:1 leaves 10 dB over: -20 dB
        assert!((loud[23999] - 0.1).abs() < 0.01, "got {}", loud[23999]);

        let mut comp = CompressorEffect::new(-30.0, 3.0, SR);
        let mut quiet = vec![0.01_f32; 24000];
        comp.process(&mut quiet);
        assert!((quiet[23999] - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_limiter_holds_ceiling() {
        let mut lim = LimiterEffect::new(-1.0, SR);
        let ceiling = db_amp(-1.0_f32);
        let mut block: Vec<f32> = (0..48000)
            .map(|i| 4.0 * (i as f32 * 440.0 * std::f32::consts::TAU / SR).sin())
            .collect();
        lim.process(&mut block);
        assert!(block.iter().all(|s| s.abs() <= ceiling + 1e-6));
    }
}
