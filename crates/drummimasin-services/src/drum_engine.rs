//! The render-side engine: transport, sequencer, voices, effects and recorder on one audio clock

use crossbeam_channel::Receiver;
use drummimasin_core::{
    DelayTime, DrumError, NoteRoute, RandomSource, SeededRandom, StepSequencer, TrackId, TrackState,
    Transport, TriggerSink, VoiceMode, Volume, route_note,
};
use tracing::{debug, info, warn};

use crate::config::{CaptureTap, EngineConfig};
use crate::effects_graph::EffectsGraph;
use crate::notify::{UiEvent, UiNotifier};
use crate::recorder::{
    CaptureFinalizer, CapturedLoop, Finalized, RawCapture, Recorder, RecorderError, RecordingState, StartOutcome,
};
use crate::sample_loader::{LoadResult, LoadTarget};
use crate::voices::{LoadApplied, PitchedInstrument, ScheduledTrigger, VoiceBank};

fn seeded(seed: Option<u64>, salt: u64) -> SeededRandom {
    match seed {
        Some(seed) => SeededRandom::new(seed ^ salt),
        None => SeededRandom::from_entropy(),
    }
}

pub struct DrumEngine {
    /// Frames rendered so far; the audio clock
    clock: u64,
    sample_rate: u32,
    lookahead: f64,
    transport: Transport,
    sequencer: StepSequencer,
    voices: VoiceBank,
    piano: PitchedInstrument,
    piano_request: Option<u64>,
    graph: EffectsGraph,
    recorder: Recorder,
    tap: CaptureTap,
    /// Mono capture-device blocks when recording from an input
    input: Option<Receiver<Vec<f32>>>,
    finalizer: CaptureFinalizer,
    notifier: UiNotifier,
    track_buffers: Vec<Vec<f32>>,
    piano_buffer: Vec<f32>,
    mix: Vec<f32>,
}

impl std::fmt::Debug for DrumEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrumEngine")
            .field("clock", &self.clock)
            .field("sample_rate", &self.sample_rate)
            .field("transport", &self.transport)
            .field("recording", &self.recorder.state())
            .finish()
    }
}

impl DrumEngine {
    pub fn new(config: &EngineConfig, sample_rate: u32, notifier: UiNotifier) -> Self {
        let rate = sample_rate as f32;
        let rng: Box<dyn RandomSource> = Box::new(seeded(config.seed, 0));
        let sequencer = StepSequencer::new(config.step_count, rng).with_observer(Box::new(notifier.clone()));
        let reverb_seed = config.seed.unwrap_or_else(|| fastrand::u64(..));
        let transport = Transport::new(config.bpm);

        let mut voices = VoiceBank::new(rate);
        if config.synth_on_start {
            for track in TrackId::DRUMS {
                if let Err(e) = voices.voice_mut(track).set_mode(VoiceMode::Synth) {
                    warn!(%track, error = %e, "No synth for track");
                }
            }
        }

        info!(sample_rate, bpm = transport.bpm(), steps = config.step_count.len(), "Drum engine created");

        Self {
            clock: 0,
            sample_rate,
            lookahead: config.lookahead_secs(),
            graph: EffectsGraph::new(rate, transport.bpm(), &config.reverb, reverb_seed),
            transport,
            sequencer,
            voices,
            piano: PitchedInstrument::new(rate),
            piano_request: None,
            recorder: Recorder::new(config.recorder.clone(), sample_rate),
            tap: config.recorder.tap,
            input: None,
            finalizer: CaptureFinalizer::spawn(sample_rate),
            notifier,
            track_buffers: vec![Vec::new(); TrackId::ALL.len()],
            piano_buffer: Vec::new(),
            mix: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Audio clock in seconds
    pub fn now(&self) -> f64 {
        self.clock as f64 / self.sample_rate as f64
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn sequencer(&self) -> &StepSequencer {
        &self.sequencer
    }

    pub fn voices(&self) -> &VoiceBank {
        &self.voices
    }

    pub fn graph(&self) -> &EffectsGraph {
        &self.graph
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn pending_triggers(&self) -> &[ScheduledTrigger] {
        self.voices.pending()
    }

    // -- transport --

    pub fn start(&mut self) -> bool {
        let now = self.now();
        let started = self.transport.start(now);
        if started {
            info!(now, bpm = self.transport.bpm(), "Transport started");
        }
        started
    }

    /// Rewind and drop every queued hit of the old timeline
    pub fn stop(&mut self) -> bool {
        if !self.transport.stop() {
            return false;
        }
        let generation = self.transport.generation();
        let cancelled = self.voices.cancel_stale(generation);
        self.notifier.send(UiEvent::TransportStopped { generation });
        info!(cancelled, generation, "Transport stopped");
        true
    }

    pub fn toggle_play(&mut self) -> bool {
        if self.transport.is_playing() {
            self.stop();
            false
        } else {
            self.start();
            true
        }
    }

    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        let bpm = self.transport.set_tempo(bpm);
        self.graph.set_tempo(bpm);
        debug!(bpm, "Tempo");
        bpm
    }

    // -- pattern --

    pub fn toggle_step(&mut self, track: TrackId, step: usize) -> Result<bool, DrumError> {
        self.sequencer.toggle_step(track, step)
    }

    pub fn randomize_track(&mut self, track: TrackId) {
        self.sequencer.randomize_track(track);
    }

    pub fn randomize_all(&mut self) {
        self.sequencer.randomize_all();
    }

    pub fn clear_track(&mut self, track: TrackId) {
        self.sequencer.clear_track(track);
    }

    pub fn set_remix_amount(&mut self, amount: f64) -> f64 {
        self.sequencer.set_remix_amount(amount)
    }

    pub fn set_muted(&mut self, track: TrackId, muted: bool) {
        self.sequencer.set_muted(track, muted);
    }

    pub fn set_soloed(&mut self, track: TrackId, soloed: bool) {
        self.sequencer.set_soloed(track, soloed);
    }

    // -- triggering --

    /// Schedule a hit at an audio-clock time; past times play on the next frame
    pub fn trigger(&mut self, track: TrackId, time: f64, velocity: f32) {
        TriggerSink::trigger(&mut self.voices, track, time, velocity);
    }

    pub fn trigger_now(&mut self, track: TrackId, velocity: f32) {
        let now = self.now();
        self.trigger(track, now, velocity);
    }

    /// Route a MIDI note-on through the note table
    pub fn trigger_note(&mut self, note: u8, velocity: f32) -> NoteRoute {
        let route = route_note(note);
        match route {
            NoteRoute::Drum(track) => self.trigger_now(track, velocity),
            NoteRoute::Pitched(note) => self.piano.attack(note, velocity),
            NoteRoute::Unmapped => debug!(note, "Unmapped note ignored"),
        }
        route
    }

    pub fn release_note(&mut self, note: u8) {
        if let NoteRoute::Pitched(note) = route_note(note) {
            self.piano.release(note);
        }
    }

    pub fn trigger_piano_attack(&mut self, note: u8, velocity: f32) {
        self.piano.attack(note, velocity);
    }

    pub fn trigger_piano_release(&mut self, note: u8) {
        self.piano.release(note);
    }

    // -- voices --

    pub fn set_mode(&mut self, track: TrackId, mode: VoiceMode) -> Result<(), DrumError> {
        self.voices.voice_mut(track).set_mode(mode)
    }

    pub fn set_detune(&mut self, track: TrackId, cents: f32) -> f64 {
        self.voices.voice_mut(track).set_detune(cents)
    }

    pub fn begin_load(&mut self, target: LoadTarget, request: u64) {
        match target {
            LoadTarget::Track(track) => self.voices.voice_mut(track).begin_load(request),
            LoadTarget::Piano => self.piano_request = Some(request),
        }
    }

    /// Apply a finished load and tell the UI how it went
    pub fn finish_load(&mut self, result: LoadResult) -> LoadApplied {
        let LoadResult { id, target, location, outcome } = result;
        let error = outcome.as_ref().err().cloned();
        let applied = match target {
            LoadTarget::Track(track) => self.voices.voice_mut(track).finish_load(id, outcome),
            LoadTarget::Piano if self.piano_request != Some(id) => LoadApplied::Stale,
            LoadTarget::Piano => {
                self.piano_request = None;
                match outcome {
                    Ok(buffer) => {
                        self.piano.set_sample(Some(buffer));
                        LoadApplied::Applied
                    }
                    Err(e) => {
                        warn!(error = %e, "Piano sample load failed");
                        LoadApplied::Failed
                    }
                }
            }
        };

        let track = match target {
            LoadTarget::Track(track) => Some(track),
            LoadTarget::Piano => None,
        };
        match (applied, error) {
            (LoadApplied::Applied, _) => self.notifier.send(UiEvent::SampleLoaded { track, location }),
            (LoadApplied::Failed, Some(error)) => {
                self.notifier.send(UiEvent::SampleLoadFailed { track, location, error })
            }
            _ => debug!(id, "Stale sample load discarded"),
        }
        applied
    }

    pub fn track_state(&self, track: TrackId) -> TrackState {
        let voice = self.voices.voice(track);
        TrackState {
            track,
            mode: voice.mode(),
            has_sample: voice.has_sample(),
            detune_cents: voice.detune_cents(),
            delay: self.graph.delay(track),
            volume: self.graph.volume(track),
            muted: self.sequencer.is_muted(track),
            soloed: self.sequencer.is_soloed(track),
        }
    }

    // -- mixing --

    pub fn set_delay_wet(&mut self, track: TrackId, amount: f32) -> f32 {
        self.graph.set_delay_wet(track, amount)
    }

    pub fn set_delay_feedback(&mut self, track: TrackId, input: f32) -> f32 {
        self.graph.set_delay_feedback(track, input)
    }

    pub fn set_delay_time(&mut self, track: TrackId, control: f32) -> DelayTime {
        self.graph.set_delay_time(track, control)
    }

    pub fn set_volume(&mut self, track: TrackId, level: f32) -> Volume {
        self.graph.set_volume(track, level)
    }

    pub fn set_reverb_wet(&mut self, wet: f32) -> f32 {
        self.graph.set_reverb_wet(wet)
    }

    pub fn set_effects_mix(&mut self, amount: f32) {
        self.graph.set_effects_mix(amount);
    }

    pub fn set_ping_pong(&mut self, on: bool) {
        self.graph.set_ping_pong(on);
    }

    // -- recording --

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    pub fn start_recording(&mut self) -> RecordingState {
        let now = self.now();
        match self.recorder.start(now) {
            StartOutcome::Stopped(raw) => self.submit_capture(raw),
            StartOutcome::Disabled => warn!("Recorder is disabled, no capture source"),
            StartOutcome::Preparing | StartOutcome::Cancelled => {}
        }
        self.recorder.state()
    }

    pub fn stop_recording(&mut self) -> RecordingState {
        if let Some(raw) = self.recorder.stop() {
            self.submit_capture(raw);
        }
        self.recorder.state()
    }

    fn submit_capture(&mut self, raw: RawCapture) {
        let auto = raw.auto;
        self.notifier.send(UiEvent::RecordingStopped { auto });
        if let Err(e) = self.finalizer.submit(raw) {
            self.capture_failed(&e);
        }
    }

    /// Finished takes from the finalizer worker
    pub fn capture_receiver(&self) -> Receiver<Finalized> {
        self.finalizer.receiver()
    }

    /// Drop a take that could not be finalized; the live voice keeps its old loop
    pub fn capture_failed(&mut self, error: &RecorderError) {
        warn!(error = %error, "Capture dropped");
        self.recorder.finish();
        self.notifier.send(UiEvent::RecordingFailed { error: error.to_string() });
    }

    /// Hand a finished loop to the live track
    pub fn assign_live_loop(&mut self, captured: &CapturedLoop) {
        let buffer = captured.to_sample_buffer();
        let frames = buffer.len();
        let live = self.voices.voice_mut(TrackId::Live);
        live.assign_buffer(buffer);
        live.set_detune(0.0);
        self.recorder.finish();
        self.notifier.send(UiEvent::LiveLoopAssigned { frames });
        info!(frames, secs = captured.duration_secs(), "Live loop assigned");
    }

    /// Feed the recorder from a capture device instead of the master bus
    pub fn attach_input(&mut self, blocks: Receiver<Vec<f32>>, sample_rate: u32) {
        self.recorder.set_source_rate(sample_rate);
        self.input = Some(blocks);
        info!(sample_rate, "Capture input attached");
    }

    pub fn disable_recorder(&mut self) {
        self.recorder.disable();
        self.input = None;
    }

    pub fn capture_tap(&self) -> CaptureTap {
        self.tap
    }

    // -- rendering --

    /// Fill an interleaved output block; every channel gets the mono mix
    pub fn render(&mut self, out: &mut [f32], channels: u16) {
        let channels = channels.max(1) as usize;
        let frames = out.len() / channels;
        let rate = self.sample_rate as f64;
        let block_start = self.clock as f64 / rate;
        let block_end = (self.clock + frames as u64) as f64 / rate;

        self.recorder.advance(block_start);

        for tick in self.transport.due_steps(block_end + self.lookahead) {
            let mut sink = self.voices.sequencer_sink(tick.generation);
            self.sequencer.tick(tick, &mut sink);
        }

        for buffer in &mut self.track_buffers {
            buffer.clear();
            buffer.resize(frames, 0.0);
        }
        self.piano_buffer.clear();
        self.piano_buffer.resize(frames, 0.0);
        self.mix.clear();
        self.mix.resize(frames, 0.0);

        let mut frame = [0.0_f32; TrackId::ALL.len()];
        for i in 0..frames {
            self.voices.render_frame(self.clock + i as u64, &mut frame);
            for (buffer, sample) in self.track_buffers.iter_mut().zip(frame) {
                buffer[i] = sample;
            }
            self.piano_buffer[i] = self.piano.next_sample();
        }

        self.graph.process(&mut self.track_buffers, &self.piano_buffer, &mut self.mix);
        self.capture_block();

        for (frame, sample) in out.chunks_mut(channels).zip(&self.mix) {
            frame.fill(*sample);
        }
        self.clock += frames as u64;
    }

    fn capture_block(&mut self) {
        let recording = self.recorder.state() == RecordingState::Recording;
        let finished = match (self.tap, &self.input) {
            (CaptureTap::Master, _) => self.recorder.capture(&self.mix),
            (CaptureTap::Input, Some(blocks)) => {
                let mut finished = None;
                while let Ok(block) = blocks.try_recv() {
                    if !recording || finished.is_some() {
                        continue;
                    }
                    finished = self.recorder.capture(&block);
                }
                finished
            }
            (CaptureTap::Input, None) => None,
        };
        if let Some(raw) = finished {
            self.submit_capture(raw);
        }
    }
}
