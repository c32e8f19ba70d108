//! Per-track voices and the bank that schedules their triggers

pub mod drum_synth;
pub mod pitched;
pub mod sample_player;

pub use drum_synth::{Adsr, AdsrShape, DrumSynth, SynthArchetype};
pub use pitched::{PIANO_BASE_NOTE, PitchedInstrument};
pub use sample_player::{DecodeError, SampleBuffer, SamplePlayer};

use drummimasin_core::track::{clamp_detune, detune_ratio};
use drummimasin_core::{DrumError, TrackId, TriggerSink, VoiceMode};
use tracing::{debug, trace, warn};

/// Where a voice's sample currently stands
#[derive(Debug, Clone)]
pub enum SampleSlot {
    Unloaded,
    /// A fetch is in flight; `previous` is restored if it fails
    Loading { request: u64, previous: Option<SampleBuffer> },
    Ready(SampleBuffer),
}

/// Result of handing a finished load to a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadApplied {
    Applied,
    Failed,
    /// A newer request superseded this one
    Stale,
}

/// One track's sound source: mode, optional synth, and sample playback
#[derive(Debug)]
pub struct Voice {
    track: TrackId,
    mode: VoiceMode,
    slot: SampleSlot,
    synth: Option<DrumSynth>,
    player: SamplePlayer,
    detune_cents: f32,
}

impl Voice {
    pub fn new(track: TrackId, sample_rate: f32) -> Self {
        Self {
            track,
            mode: VoiceMode::Empty,
            slot: SampleSlot::Unloaded,
            synth: SynthArchetype::for_track(track).map(|a| DrumSynth::new(a, sample_rate)),
            player: SamplePlayer::new(sample_rate),
            detune_cents: 0.0,
        }
    }

    pub fn track(&self) -> TrackId {
        self.track
    }

    pub fn mode(&self) -> VoiceMode {
        self.mode
    }

    pub fn has_synth(&self) -> bool {
        self.synth.is_some()
    }

    /// The bound buffer, kept while a replacement is loading
    pub fn buffer(&self) -> Option<&SampleBuffer> {
        match &self.slot {
            SampleSlot::Ready(buffer) => Some(buffer),
            SampleSlot::Loading { previous, .. } => previous.as_ref(),
            SampleSlot::Unloaded => None,
        }
    }

    pub fn has_sample(&self) -> bool {
        self.buffer().is_some()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.slot, SampleSlot::Loading { .. })
    }

    pub fn slot(&self) -> &SampleSlot {
        &self.slot
    }

    pub fn set_mode(&mut self, mode: VoiceMode) -> Result<(), DrumError> {
        match mode {
            VoiceMode::Synth if self.synth.is_none() => return Err(DrumError::NoSynth(self.track)),
            VoiceMode::Sample if !self.has_sample() => return Err(DrumError::NoSample(self.track)),
            _ => {}
        }
        debug!(track = %self.track, ?mode, "Voice mode changed");
        self.mode = mode;
        Ok(())
    }

    /// Mark a fetch as in flight, keeping the current buffer aside
    pub fn begin_load(&mut self, request: u64) {
        let previous = self.buffer().cloned();
        self.slot = SampleSlot::Loading { request, previous };
    }

    pub fn finish_load(&mut self, request: u64, outcome: Result<SampleBuffer, String>) -> LoadApplied {
        let SampleSlot::Loading { request: pending, previous } = &mut self.slot else {
            return LoadApplied::Stale;
        };
        if *pending != request {
            return LoadApplied::Stale;
        }
        match outcome {
            Ok(buffer) => {
                debug!(track = %self.track, name = buffer.name(), frames = buffer.len(), "Sample bound");
                self.slot = SampleSlot::Ready(buffer);
                self.mode = VoiceMode::Sample;
                LoadApplied::Applied
            }
            Err(e) => {
                warn!(track = %self.track, error = %e, "Sample load failed, keeping previous state");
                self.slot = match previous.take() {
                    Some(buffer) => SampleSlot::Ready(buffer),
                    None => SampleSlot::Unloaded,
                };
                LoadApplied::Failed
            }
        }
    }

    /// Bind a buffer directly and switch to sample playback
    pub fn assign_buffer(&mut self, buffer: SampleBuffer) {
        self.slot = SampleSlot::Ready(buffer);
        self.mode = VoiceMode::Sample;
    }

    pub fn detune_cents(&self) -> f32 {
        self.detune_cents
    }

    /// Returns the resulting pitch / playback-rate multiplier
    pub fn set_detune(&mut self, cents: f32) -> f64 {
        self.detune_cents = clamp_detune(cents);
        let ratio = detune_ratio(self.detune_cents);
        if let Some(synth) = &mut self.synth {
            synth.set_pitch_ratio(ratio);
        }
        self.player.set_speed(ratio);
        ratio
    }

    pub fn playback_rate(&self) -> f64 {
        detune_ratio(self.detune_cents)
    }

    pub fn trigger(&mut self, velocity: f32) {
        let velocity = if velocity.is_finite() { velocity.clamp(0.0, 1.0) } else { 0.0 };
        match self.mode {
            VoiceMode::Empty => {}
            VoiceMode::Synth => {
                if let Some(synth) = &mut self.synth {
                    synth.trigger(velocity);
                }
            }
            VoiceMode::Sample => match &self.slot {
                SampleSlot::Ready(buffer) => {
                    let rate = detune_ratio(self.detune_cents);
                    self.player.play(buffer, rate, velocity);
                }
                SampleSlot::Loading { .. } | SampleSlot::Unloaded => {
                    trace!(track = %self.track, "Trigger dropped, sample not ready");
                }
            },
        }
    }

    /// Both sources render so tails survive a mode switch
    pub fn next_sample(&mut self) -> f32 {
        let synth = self.synth.as_mut().map_or(0.0, DrumSynth::next_sample);
        synth + self.player.next_sample()
    }

    pub fn is_sounding(&self) -> bool {
        self.player.is_active() || self.synth.as_ref().is_some_and(DrumSynth::is_active)
    }
}

/// A trigger waiting for its sample frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTrigger {
    pub at_sample: u64,
    pub track: TrackId,
    pub velocity: f32,
    /// Transport generation for sequencer hits, `None` for manual hits
    pub generation: Option<u64>,
}

/// Every track's voice plus the queue of upcoming triggers
#[derive(Debug)]
pub struct VoiceBank {
    voices: Vec<Voice>,
    pending: Vec<ScheduledTrigger>,
    sample_rate: f32,
}

impl VoiceBank {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            voices: TrackId::ALL.iter().map(|t| Voice::new(*t, sample_rate)).collect(),
            pending: Vec::new(),
            sample_rate,
        }
    }

    pub fn voice(&self, track: TrackId) -> &Voice {
        &self.voices[track.index()]
    }

    pub fn voice_mut(&mut self, track: TrackId) -> &mut Voice {
        &mut self.voices[track.index()]
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn time_to_sample(&self, time: f64) -> u64 {
        (time.max(0.0) * self.sample_rate as f64).round() as u64
    }

    pub fn schedule(&mut self, trigger: ScheduledTrigger) {
        let index = self.pending.partition_point(|p| p.at_sample <= trigger.at_sample);
        self.pending.insert(index, trigger);
    }

    pub fn pending(&self) -> &[ScheduledTrigger] {
        &self.pending
    }

    /// Drop sequencer triggers scheduled on an older timeline
    pub fn cancel_stale(&mut self, generation: u64) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|t| t.generation.is_none_or(|g| g >= generation));
        before - self.pending.len()
    }

    /// Sink that tags triggers with a transport generation
    pub fn sequencer_sink(&mut self, generation: u64) -> SequencerSink<'_> {
        SequencerSink { bank: self, generation }
    }

    /// Fire everything due at `now` (pending is sorted)
    pub fn fire_due(&mut self, now: u64) {
        let due = self.pending.partition_point(|p| p.at_sample <= now);
        if due == 0 {
            return;
        }
        for trigger in self.pending.drain(..due) {
            trace!(track = %trigger.track, at = trigger.at_sample, "Trigger");
            self.voices[trigger.track.index()].trigger(trigger.velocity);
        }
    }

    /// Render one frame for every track into `out`, indexed by track
    pub fn render_frame(&mut self, now: u64, out: &mut [f32]) {
        self.fire_due(now);
        for (slot, voice) in out.iter_mut().zip(self.voices.iter_mut()) {
            *slot = voice.next_sample();
        }
    }
}

impl TriggerSink for VoiceBank {
    fn trigger(&mut self, track: TrackId, time: f64, velocity: f32) {
        let at_sample = self.time_to_sample(time);
        self.schedule(ScheduledTrigger { at_sample, track, velocity, generation: None });
    }
}

/// Borrowed view of the bank used for one sequencer tick
pub struct SequencerSink<'a> {
    bank: &'a mut VoiceBank,
    generation: u64,
}

impl TriggerSink for SequencerSink<'_> {
    fn trigger(&mut self, track: TrackId, time: f64, velocity: f32) {
        let at_sample = self.bank.time_to_sample(time);
        self.bank.schedule(ScheduledTrigger {
            at_sample,
            track,
            velocity,
            generation: Some(self.generation),
        });
    }
}
