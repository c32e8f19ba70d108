//! Console command parsing

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use drummimasin_core::{MidiMessage, TrackId, VoiceMode};

/// Which delay control a `delay` command sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayParam {
    Wet,
    Feedback,
    Time,
}

/// Track or "all"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Track(TrackId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Stop,
    TogglePlay,
    Tempo(f64),
    Step { track: TrackId, step: usize },
    Randomize(Scope),
    Clear(TrackId),
    Remix(f64),
    Mute { track: TrackId, on: bool },
    Solo { track: TrackId, on: bool },
    Hit { track: TrackId, velocity: f32 },
    Note { note: u8, velocity: f32 },
    NoteOff(u8),
    Midi(MidiMessage),
    /// Raw keyboard input, one action per character
    Keys(String),
    Load { track: Option<TrackId>, location: String },
    RandomSample(Scope),
    Mode { track: TrackId, mode: VoiceMode },
    Detune { track: TrackId, cents: f32 },
    Delay { track: TrackId, param: DelayParam, value: f32 },
    Volume { track: TrackId, level: f32 },
    Reverb(f32),
    PingPong(bool),
    EffectsMix(f32),
    Record,
    StopRecording,
    Export(PathBuf),
    State(Option<TrackId>),
    Pattern,
    Help,
    Quit,
}

pub const HELP: &str = "\
play | stop | space        transport
tempo <bpm>
step <track> <index>       toggle a step
random <track|all>         randomize pattern
clear <track>
remix <0..1>
mute|solo <track> [on|off]
hit <track> [velocity]
note <n> [velocity] | off <n>
midi <hex bytes>           e.g. midi 90 24 7f
keys <chars>               computer keyboard input
load <track|piano> <location>
sample <track|all>         random sample from the manifest
mode <track> <empty|synth|sample>
detune <track> <cents>
delay <track> <wet|feedback|time> <value>
pingpong [on|off]          ping-pong delay on every track
volume <track> <0..100>
reverb <0..1> | fx <0..1>
rec | rec stop
export <path.wav>
state [track] | pattern | help | quit";

fn track(word: Option<&str>) -> Result<TrackId> {
    Ok(word.context("missing track")?.parse()?)
}

fn scope(word: Option<&str>) -> Result<Scope> {
    match word {
        Some("all") | None => Ok(Scope::All),
        other => Ok(Scope::Track(track(other)?)),
    }
}

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T> {
    let word = word.with_context(|| format!("missing {}", what))?;
    word.parse().ok().with_context(|| format!("bad {}: {}", what, word))
}

fn switch(word: Option<&str>) -> Result<bool> {
    match word {
        None | Some("on") => Ok(true),
        Some("off") => Ok(false),
        Some(other) => bail!("expected on or off, got {}", other),
    }
}

fn midi_bytes(words: &[&str]) -> Result<MidiMessage> {
    let bytes = words
        .iter()
        .map(|w| u8::from_str_radix(w.trim_start_matches("0x"), 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .context("midi bytes must be hex")?;
    MidiMessage::parse(&bytes).context("not a note on/off message")
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        if line == " " {
            return Ok(Self::TogglePlay);
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((head, rest)) = words.split_first() else {
            bail!("empty command");
        };
        let mut args = rest.iter().copied();

        let command = match *head {
            "play" => Self::Play,
            "stop" => Self::Stop,
            "space" => Self::TogglePlay,
            "tempo" => Self::Tempo(number(args.next(), "bpm")?),
            "step" => Self::Step { track: track(args.next())?, step: number(args.next(), "step")? },
            "random" => Self::Randomize(scope(args.next())?),
            "clear" => Self::Clear(track(args.next())?),
            "remix" => Self::Remix(number(args.next(), "amount")?),
            "mute" => Self::Mute { track: track(args.next())?, on: switch(args.next())? },
            "solo" => Self::Solo { track: track(args.next())?, on: switch(args.next())? },
            "hit" => Self::Hit {
                track: track(args.next())?,
                velocity: args.next().map_or(Ok(1.0), |v| number(Some(v), "velocity"))?,
            },
            "note" => Self::Note {
                note: number(args.next(), "note")?,
                velocity: args.next().map_or(Ok(1.0), |v| number(Some(v), "velocity"))?,
            },
            "off" => Self::NoteOff(number(args.next(), "note")?),
            "midi" => Self::Midi(midi_bytes(rest)?),
            "keys" => {
                let keys = line.trim_start().strip_prefix("keys").unwrap_or_default();
                let keys = keys.strip_prefix(' ').unwrap_or(keys);
                if keys.is_empty() {
                    bail!("missing keys");
                }
                Self::Keys(keys.to_string())
            }
            "load" => {
                let target = args.next().context("missing target")?;
                let location = args.next().context("missing location")?.to_string();
                let track = if target == "piano" { None } else { Some(track(Some(target))?) };
                Self::Load { track, location }
            }
            "sample" => Self::RandomSample(scope(args.next())?),
            "mode" => Self::Mode {
                track: track(args.next())?,
                mode: args.next().context("missing mode")?.parse()?,
            },
            "detune" => Self::Detune { track: track(args.next())?, cents: number(args.next(), "cents")? },
            "delay" => {
                let track = track(args.next())?;
                let param = match args.next() {
                    Some("wet") => DelayParam::Wet,
                    Some("feedback") => DelayParam::Feedback,
                    Some("time") => DelayParam::Time,
                    other => bail!("unknown delay parameter: {:?}", other),
                };
                Self::Delay { track, param, value: number(args.next(), "value")? }
            }
            "volume" => Self::Volume { track: track(args.next())?, level: number(args.next(), "level")? },
            "reverb" => Self::Reverb(number(args.next(), "wet")?),
            "pingpong" => Self::PingPong(switch(args.next())?),
            "fx" => Self::EffectsMix(number(args.next(), "amount")?),
            "rec" => match args.next() {
                None => Self::Record,
                Some("stop") => Self::StopRecording,
                Some(other) => bail!("unknown rec argument: {}", other),
            },
            "export" => Self::Export(PathBuf::from(args.next().context("missing path")?)),
            "state" => Self::State(args.next().map(|t| track(Some(t))).transpose()?),
            "pattern" => Self::Pattern,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command: {}", other),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pattern_commands() {
        assert_eq!(
            Command::parse("step kick 4").unwrap(),
            Command::Step { track: TrackId::Kick, step: 4 }
        );
        assert_eq!(Command::parse("random all").unwrap(), Command::Randomize(Scope::All));
        assert_eq!(
            Command::parse("random hihat").unwrap(),
            Command::Randomize(Scope::Track(TrackId::HiHat))
        );
        assert_eq!(
            Command::parse("mute snare off").unwrap(),
            Command::Mute { track: TrackId::Snare, on: false }
        );
        assert_eq!(Command::parse(" ").unwrap(), Command::TogglePlay);
    }

    #[test]
    fn test_parse_sound_commands() {
        assert_eq!(
            Command::parse("hit resonator 0.5").unwrap(),
            Command::Hit { track: TrackId::Resonator, velocity: 0.5 }
        );
        assert_eq!(
            Command::parse("load piano keys/c4.wav").unwrap(),
            Command::Load { track: None, location: "keys/c4.wav".into() }
        );
        assert_eq!(
            Command::parse("delay kick feedback 0.7").unwrap(),
            Command::Delay { track: TrackId::Kick, param: DelayParam::Feedback, value: 0.7 }
        );
        assert_eq!(
            Command::parse("mode live sample").unwrap(),
            Command::Mode { track: TrackId::Live, mode: VoiceMode::Sample }
        );
        assert_eq!(
            Command::parse("midi 90 24 7f").unwrap(),
            Command::Midi(MidiMessage::NoteOn { note: 36, velocity: 1.0 })
        );
        assert_eq!(Command::parse("keys a w ").unwrap(), Command::Keys("a w ".into()));
        assert_eq!(Command::parse("rec stop").unwrap(), Command::StopRecording);
        assert_eq!(Command::parse("pingpong").unwrap(), Command::PingPong(true));
        assert_eq!(Command::parse("pingpong off").unwrap(), Command::PingPong(false));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("step cowbell 1").is_err());
        assert!(Command::parse("tempo fast").is_err());
        assert!(Command::parse("mode kick loud").is_err());
        assert!(Command::parse("midi b0 07 7f").is_err());
        assert!(Command::parse("dance").is_err());
    }
}
