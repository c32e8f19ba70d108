//! Applies console commands to the engine; stands in for the keyboard and MIDI input layer

use anyhow::{Context, Result, anyhow};
use drummimasin_core::{KeyAction, MidiMessage, PianoKeyboard, TrackId, TrackState, key_action};
use drummimasin_services::{AudioEngine, DrumEngine, LoadTarget};
use tracing::debug;

use crate::commands::{Command, DelayParam, HELP, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

fn describe(state: &TrackState) -> String {
    format!(
        "{:<9} {:<6} sample={} detune={:+.0}c vol={:.0} delay(wet={:.2} fb={:.2} {:?}){}{}",
        state.track.name(),
        format!("{:?}", state.mode).to_lowercase(),
        state.has_sample,
        state.detune_cents,
        state.volume.level(),
        state.delay.wet(),
        state.delay.feedback(),
        state.delay.time(),
        if state.muted { " muted" } else { "" },
        if state.soloed { " solo" } else { "" },
    )
}

/// Console session state: the computer-keyboard piano and its held notes
#[derive(Debug, Default)]
pub struct Console {
    keyboard: PianoKeyboard,
    held: Vec<u8>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    fn engine_call<R>(engine: &AudioEngine, f: impl FnOnce(&mut DrumEngine) -> R) -> Result<R> {
        engine.with_engine(f).ok_or_else(|| anyhow!("engine lock poisoned"))
    }

    fn release_held(&mut self, engine: &AudioEngine) -> Result<()> {
        let held = std::mem::take(&mut self.held);
        Self::engine_call(engine, |e| {
            for note in held {
                e.trigger_piano_release(note);
            }
        })
    }

    fn keys(&mut self, engine: &AudioEngine, keys: &str) -> Result<()> {
        self.release_held(engine)?;
        for key in keys.chars() {
            let Some(action) = key_action(key) else {
                debug!(?key, "Unbound key");
                continue;
            };
            match action {
                KeyAction::TogglePlay => {
                    Self::engine_call(engine, |e| e.toggle_play())?;
                }
                KeyAction::Drum(track) => Self::engine_call(engine, |e| e.trigger_now(track, 1.0))?,
                KeyAction::PianoKey(index) => {
                    let note = self.keyboard.note_for_index(index);
                    Self::engine_call(engine, |e| e.trigger_piano_attack(note, 1.0))?;
                    self.held.push(note);
                }
                KeyAction::OctaveDown => {
                    println!("octave {:+}", self.keyboard.shift_octave(-1));
                }
                KeyAction::OctaveUp => {
                    println!("octave {:+}", self.keyboard.shift_octave(1));
                }
            }
        }
        Ok(())
    }

    fn print_pattern(engine: &AudioEngine) -> Result<()> {
        let rows = Self::engine_call(engine, |e| {
            let pattern = e.sequencer().pattern();
            let step = (e.transport().step_index() % pattern.len() as u64) as usize;
            let playing = e.transport().is_playing();
            TrackId::ALL
                .iter()
                .map(|track| {
                    let cells: String = pattern
                        .row(*track)
                        .iter()
                        .enumerate()
                        .map(|(i, on)| match (*on, playing && i == step) {
                            (true, _) => 'x',
                            (false, true) => '|',
                            (false, false) => '.',
                        })
                        .collect();
                    format!("{:<9} {}", track.name(), cells)
                })
                .collect::<Vec<_>>()
        })?;
        for row in rows {
            println!("{}", row);
        }
        Ok(())
    }

    pub fn execute(&mut self, engine: &mut AudioEngine, command: Command) -> Result<Flow> {
        match command {
            Command::Play => {
                Self::engine_call(engine, |e| e.start())?;
            }
            Command::Stop => {
                Self::engine_call(engine, |e| e.stop())?;
            }
            Command::TogglePlay => {
                Self::engine_call(engine, |e| e.toggle_play())?;
            }
            Command::Tempo(bpm) => {
                let bpm = Self::engine_call(engine, |e| e.set_tempo(bpm))?;
                println!("tempo {:.1}", bpm);
            }
            Command::Step { track, step } => {
                let on = Self::engine_call(engine, |e| e.toggle_step(track, step))??;
                println!("{} step {} {}", track, step, if on { "on" } else { "off" });
            }
            Command::Randomize(Scope::All) => Self::engine_call(engine, |e| e.randomize_all())?,
            Command::Randomize(Scope::Track(track)) => Self::engine_call(engine, |e| e.randomize_track(track))?,
            Command::Clear(track) => Self::engine_call(engine, |e| e.clear_track(track))?,
            Command::Remix(amount) => {
                let amount = Self::engine_call(engine, |e| e.set_remix_amount(amount))?;
                println!("remix {:.2}", amount);
            }
            Command::Mute { track, on } => Self::engine_call(engine, |e| e.set_muted(track, on))?,
            Command::Solo { track, on } => Self::engine_call(engine, |e| e.set_soloed(track, on))?,
            Command::Hit { track, velocity } => Self::engine_call(engine, |e| e.trigger_now(track, velocity))?,
            Command::Note { note, velocity } => {
                let route = Self::engine_call(engine, |e| e.trigger_note(note, velocity))?;
                debug!(note, ?route, "Note");
            }
            Command::NoteOff(note) => Self::engine_call(engine, |e| e.release_note(note))?,
            Command::Midi(MidiMessage::NoteOn { note, velocity }) => {
                Self::engine_call(engine, |e| e.trigger_note(note, velocity))?;
            }
            Command::Midi(MidiMessage::NoteOff { note }) => Self::engine_call(engine, |e| e.release_note(note))?,
            Command::Keys(keys) => self.keys(engine, &keys)?,
            Command::Load { track, location } => {
                let target = track.map_or(LoadTarget::Piano, LoadTarget::Track);
                let id = engine.load_sample(target, &location);
                println!("loading {} (request {})", location, id);
            }
            Command::RandomSample(Scope::All) => {
                println!("loading {} samples", engine.randomize_all_samples());
            }
            Command::RandomSample(Scope::Track(track)) => {
                if engine.randomize_sample(track).is_none() {
                    println!("no manifest entries for {}", track);
                }
            }
            Command::Mode { track, mode } => Self::engine_call(engine, |e| e.set_mode(track, mode))??,
            Command::Detune { track, cents } => {
                let rate = Self::engine_call(engine, |e| e.set_detune(track, cents))?;
                println!("{} rate {:.4}", track, rate);
            }
            Command::Delay { track, param, value } => {
                Self::engine_call(engine, |e| match param {
                    DelayParam::Wet => {
                        e.set_delay_wet(track, value);
                    }
                    DelayParam::Feedback => {
                        e.set_delay_feedback(track, value);
                    }
                    DelayParam::Time => {
                        e.set_delay_time(track, value);
                    }
                })?;
            }
            Command::Volume { track, level } => {
                let volume = Self::engine_call(engine, |e| e.set_volume(track, level))?;
                println!("{} {:.1} dB", track, volume.db());
            }
            Command::Reverb(wet) => {
                Self::engine_call(engine, |e| e.set_reverb_wet(wet))?;
            }
            Command::PingPong(on) => {
                Self::engine_call(engine, |e| e.set_ping_pong(on))?;
                println!("delay {}", if on { "ping-pong" } else { "mono" });
            }
            Command::EffectsMix(amount) => Self::engine_call(engine, |e| e.set_effects_mix(amount))?,
            Command::Record => println!("recorder {:?}", engine.start_recording()),
            Command::StopRecording => println!("recorder {:?}", engine.stop_recording()),
            Command::Export(path) => {
                let captured = engine.last_capture().context("nothing recorded yet")?;
                captured.write_wav(&path)?;
                println!("wrote {}", path.display());
            }
            Command::State(Some(track)) => {
                let state = engine.track_state(track).context("engine lock poisoned")?;
                println!("{}", describe(&state));
            }
            Command::State(None) => {
                for track in TrackId::ALL {
                    if let Some(state) = engine.track_state(track) {
                        println!("{}", describe(&state));
                    }
                }
            }
            Command::Pattern => Self::print_pattern(engine)?,
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drummimasin_core::VoiceMode;
    use drummimasin_services::{DefaultFetcher, EngineConfig};
    use std::sync::Arc;

    fn engine() -> AudioEngine {
        let config = EngineConfig { seed: Some(5), ..EngineConfig::default() };
        AudioEngine::new(&config, 48000, Arc::new(DefaultFetcher::new())).0
    }

    #[test]
    fn test_commands_reach_the_engine() {
        let mut engine = engine();
        let mut console = Console::new();
        console.execute(&mut engine, Command::parse("step kick 0").unwrap()).unwrap();
        console.execute(&mut engine, Command::parse("solo snare").unwrap()).unwrap();
        console.execute(&mut engine, Command::parse("mode kick empty").unwrap()).unwrap();

        let on = engine.with_engine(|e| e.sequencer().pattern().get(TrackId::Kick, 0)).unwrap();
        assert!(on);
        let kick = engine.track_state(TrackId::Kick).unwrap();
        assert_eq!(kick.mode, VoiceMode::Empty);
        assert!(engine.track_state(TrackId::Snare).unwrap().soloed);

        console.execute(&mut engine, Command::parse("pingpong on").unwrap()).unwrap();
        assert!(engine.with_engine(|e| e.graph().ping_pong()).unwrap());
    }

    #[test]
    fn test_keys_play_and_shift_octave() {
        let mut engine = engine();
        let mut console = Console::new();
        console.execute(&mut engine, Command::Keys("xc ".into())).unwrap();
        assert_eq!(console.keyboard.octave_offset(), 1);
        assert!(engine.with_engine(|e| e.transport().is_playing()).unwrap());
        assert_eq!(engine.with_engine(|e| e.pending_triggers().len()).unwrap(), 1);

        console.execute(&mut engine, Command::Keys("a".into())).unwrap();
        assert_eq!(console.held, vec![60]);
    }

    #[test]
    fn test_rejected_mode_is_an_error() {
        let mut engine = engine();
        let mut console = Console::new();
        assert!(console.execute(&mut engine, Command::parse("mode live synth").unwrap()).is_err());
        assert!(console.execute(&mut engine, Command::parse("export /tmp/x.wav").unwrap()).is_err());
        assert_eq!(console.execute(&mut engine, Command::Quit).unwrap(), Flow::Quit);
    }
}
