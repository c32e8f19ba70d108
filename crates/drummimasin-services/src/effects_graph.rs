//! Track chains (gain, delay) summed into the master bus (reverb, compressor, limiter)

use drummimasin_core::{DelaySettings, DelayTime, TrackId, Volume};
use tracing::debug;

use crate::audio_effects::{
    CompressorEffect, DelayEffect, EffectChain, GainEffect, LimiterEffect, ReverbEffect,
};
use crate::config::ReverbConfig;

pub const COMPRESSOR_THRESHOLD_DB: f32 = -30.0;
pub const COMPRESSOR_RATIO: f32 = 3.0;
pub const LIMITER_CEILING_DB: f32 = -1.0;
/// Reverb wet reached when the effects mix is at full
pub const MAX_REVERB_MIX: f32 = 0.4;

const GAIN: &str = "Gain";
const DELAY: &str = "Delay";
const REVERB: &str = "Reverb";

#[derive(Debug)]
struct TrackChain {
    chain: EffectChain,
    delay: DelaySettings,
    volume: Volume,
}

impl TrackChain {
    fn new(bpm: f64, sample_rate: f32) -> Self {
        let delay = DelaySettings::default();
        let volume = Volume::default();
        let chain = EffectChain::new().with(GainEffect::new(volume.level())).with(DelayEffect::new(
            delay.time().seconds(bpm) as f32,
            delay.feedback(),
            delay.wet(),
            sample_rate,
        ));
        Self { chain, delay, volume }
    }
}

/// The whole mixing graph, owned by the render engine
#[derive(Debug)]
pub struct EffectsGraph {
    tracks: Vec<TrackChain>,
    master: EffectChain,
    bpm: f64,
    reverb_wet: f32,
    ping_pong: bool,
    scratch: Vec<f32>,
}

impl EffectsGraph {
    pub fn new(sample_rate: f32, bpm: f64, reverb: &ReverbConfig, seed: u64) -> Self {
        // impulse response is generated here, once
        let master = EffectChain::new()
            .with(ReverbEffect::new(reverb.decay_secs, reverb.wet, sample_rate, seed))
            .with(CompressorEffect::new(COMPRESSOR_THRESHOLD_DB, COMPRESSOR_RATIO, sample_rate))
            .with(LimiterEffect::new(LIMITER_CEILING_DB, sample_rate));

        Self {
            tracks: TrackId::ALL.iter().map(|_| TrackChain::new(bpm, sample_rate)).collect(),
            master,
            bpm,
            reverb_wet: reverb.wet.clamp(0.0, 1.0),
            ping_pong: false,
            scratch: Vec::new(),
        }
    }

    fn track(&mut self, track: TrackId) -> &mut TrackChain {
        &mut self.tracks[track.index()]
    }

    pub fn delay(&self, track: TrackId) -> DelaySettings {
        self.tracks[track.index()].delay
    }

    pub fn volume(&self, track: TrackId) -> Volume {
        self.tracks[track.index()].volume
    }

    pub fn reverb_wet(&self) -> f32 {
        self.reverb_wet
    }

    pub fn set_delay_wet(&mut self, track: TrackId, amount: f32) -> f32 {
        let chain = self.track(track);
        let wet = chain.delay.set_wet(amount);
        chain.chain.set_param(DELAY, "wet", wet);
        debug!(%track, wet, "Delay wet");
        wet
    }

    pub fn set_delay_feedback(&mut self, track: TrackId, input: f32) -> f32 {
        let chain = self.track(track);
        let feedback = chain.delay.set_feedback(input);
        chain.chain.set_param(DELAY, "feedback", feedback);
        debug!(%track, feedback, "Delay feedback");
        feedback
    }

    pub fn set_delay_time(&mut self, track: TrackId, control: f32) -> DelayTime {
        let bpm = self.bpm;
        let chain = self.track(track);
        let time = chain.delay.set_time(control);
        chain.chain.set_param(DELAY, "time", time.seconds(bpm) as f32);
        debug!(%track, ?time, "Delay time");
        time
    }

    pub fn set_volume(&mut self, track: TrackId, level: f32) -> Volume {
        let chain = self.track(track);
        chain.volume = Volume::new(level);
        chain.chain.set_param(GAIN, "volume", chain.volume.level());
        chain.volume
    }

    pub fn ping_pong(&self) -> bool {
        self.ping_pong
    }

    /// Switch every track delay between mono and ping-pong; time, feedback and wet carry over
    pub fn set_ping_pong(&mut self, on: bool) {
        self.ping_pong = on;
        for chain in &mut self.tracks {
            chain.chain.set_param(DELAY, "ping_pong", if on { 1.0 } else { 0.0 });
        }
        debug!(on, "Ping-pong delay");
    }

    pub fn set_reverb_wet(&mut self, wet: f32) -> f32 {
        self.reverb_wet = if wet.is_finite() { wet.clamp(0.0, 1.0) } else { 0.0 };
        self.master.set_param(REVERB, "wet", self.reverb_wet);
        self.reverb_wet
    }

    /// One control for every delay (up to 0.5 wet) and the reverb (up to 0.4 wet)
    pub fn set_effects_mix(&mut self, amount: f32) {
        let amount = if amount.is_finite() { amount.clamp(0.0, 1.0) } else { 0.0 };
        for track in TrackId::ALL {
            self.set_delay_wet(track, amount);
        }
        self.set_reverb_wet(amount * MAX_REVERB_MIX);
    }

    /// Retimes every delay to the new tempo
    pub fn set_tempo(&mut self, bpm: f64) {
        self.bpm = bpm;
        for chain in &mut self.tracks {
            let secs = chain.delay.time().seconds(bpm) as f32;
            chain.chain.set_param(DELAY, "time", secs);
        }
    }

    pub fn delay_seconds(&self, track: TrackId) -> f32 {
        self.tracks[track.index()]
            .chain
            .find(DELAY)
            .and_then(|d| d.param("time"))
            .unwrap_or(0.0)
    }

    /// Run each track buffer through its chain, sum with `extra`, then the master bus
    pub fn process(&mut self, track_buffers: &mut [Vec<f32>], extra: &[f32], out: &mut [f32]) {
        out.copy_from_slice(extra);
        for (chain, buffer) in self.tracks.iter_mut().zip(track_buffers.iter_mut()) {
            let frames = out.len().min(buffer.len());
            self.scratch.clear();
            self.scratch.extend_from_slice(&buffer[..frames]);
            chain.chain.process(&mut self.scratch);
            for (o, s) in out.iter_mut().zip(&self.scratch) {
                *o += *s;
            }
        }
        self.master.process(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn graph() -> EffectsGraph {
        EffectsGraph::new(SR, 120.0, &ReverbConfig { decay_secs: 0.5, wet: 0.0 }, 1)
    }

    #[test]
    fn test_effects_mix_drives_delays_and_reverb() {
        let mut graph = graph();
        graph.set_effects_mix(1.0);
        for track in TrackId::ALL {
            assert_eq!(graph.delay(track).wet(), 0.5);
        }
        assert!((graph.reverb_wet() - 0.4).abs() < 1e-6);

        graph.set_effects_mix(0.5);
        assert_eq!(graph.delay(TrackId::Kick).wet(), 0.25);
        assert!((graph.reverb_wet() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_ping_pong_keeps_delay_settings() {
        let mut graph = graph();
        graph.set_delay_feedback(TrackId::Kick, 0.5);
        graph.set_delay_wet(TrackId::Kick, 1.0);
        graph.set_ping_pong(true);
        assert!(graph.ping_pong());

        let delay = graph.tracks[TrackId::Kick.index()].chain.find(DELAY).unwrap();
        assert_eq!(delay.param("ping_pong"), Some(1.0));
        assert!((delay.param("feedback").unwrap() - 0.45).abs() < 1e-6);
        assert_eq!(delay.param("wet"), Some(0.5));
        assert!((graph.delay_seconds(TrackId::Kick) - 0.25).abs() < 1e-6);

        graph.set_ping_pong(false);
        let delay = graph.tracks[TrackId::Snare.index()].chain.find(DELAY).unwrap();
        assert_eq!(delay.param("ping_pong"), Some(0.0));
    }

    #[test]
    fn test_delay_follows_tempo() {
        let mut graph = graph();
        assert_eq!(graph.set_delay_time(TrackId::Snare, 0.75), DelayTime::Quarter);
        assert!((graph.delay_seconds(TrackId::Snare) - 0.5).abs() < 1e-6);
        graph.set_tempo(60.0);
        assert!((graph.delay_seconds(TrackId::Snare) - 1.0).abs() < 1e-6);
        // default is an eighth
        assert!((graph.delay_seconds(TrackId::Kick) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_muted_volume_removes_track() {
        let mut graph = graph();
        graph.set_volume(TrackId::Kick, 0.0);
        let mut buffers: Vec<Vec<f32>> = TrackId::ALL.iter().map(|_| vec![0.0; 256]).collect();
        buffers[0].fill(0.5);
        let extra = vec![0.0; 256];
        let mut out = vec![1.0; 256];
        graph.process(&mut buffers, &extra, &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_master_output_stays_under_ceiling() {
        let mut graph = graph();
        for track in TrackId::ALL {
            graph.set_volume(track, 100.0);
        }
        let mut buffers: Vec<Vec<f32>> = TrackId::ALL.iter().map(|_| vec![0.9; 4800]).collect();
        let extra = vec![0.9; 4800];
        let mut out = vec![0.0; 4800];
        graph.process(&mut buffers, &extra, &mut out);
        let ceiling = 10f32.powf(LIMITER_CEILING_DB / 20.0);
        assert!(out.iter().all(|s| s.abs() <= ceiling + 1e-6));
    }

    #[test]
    fn test_out_of_range_controls_are_clamped() {
        let mut graph = graph();
        assert_eq!(graph.set_delay_feedback(TrackId::HiHat, 3.0), 0.9);
        assert_eq!(graph.set_delay_wet(TrackId::HiHat, -2.0), 0.0);
        assert_eq!(graph.set_reverb_wet(f32::INFINITY), 0.0);
        assert_eq!(graph.set_volume(TrackId::HiHat, 400.0).level(), 100.0);
    }
}
