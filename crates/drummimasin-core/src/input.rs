//! MIDI and computer-keyboard routing tables

use crate::track::TrackId;

pub const NOTE_KICK: u8 = 36;
pub const NOTE_SNARE: u8 = 38;
pub const NOTE_HIHAT: u8 = 42;
pub const NOTE_RESONATOR: u8 = 46;
/// Notes from here up go to the pitched instrument
pub const PITCHED_NOTE_FLOOR: u8 = 48;

/// Where an incoming note ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteRoute {
    Drum(TrackId),
    Pitched(u8),
    Unmapped,
}

pub fn route_note(note: u8) -> NoteRoute {
    match note {
        NOTE_KICK => NoteRoute::Drum(TrackId::Kick),
        NOTE_SNARE => NoteRoute::Drum(TrackId::Snare),
        NOTE_HIHAT => NoteRoute::Drum(TrackId::HiHat),
        NOTE_RESONATOR => NoteRoute::Drum(TrackId::Resonator),
        n if n >= PITCHED_NOTE_FLOOR => NoteRoute::Pitched(n),
        _ => NoteRoute::Unmapped,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiMessage {
    NoteOn { note: u8, velocity: f32 },
    NoteOff { note: u8 },
}

impl MidiMessage {
    /// Parse a raw channel message; anything but note on/off is ignored
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let &[status, note, velocity, ..] = bytes else {
            return None;
        };
        let note = note & 0x7f;
        let velocity = velocity & 0x7f;
        match status & 0xf0 {
            0x90 if velocity > 0 => Some(Self::NoteOn { note, velocity: velocity as f32 / 127.0 }),
            0x90 | 0x80 => Some(Self::NoteOff { note }),
            _ => None,
        }
    }
}

/// What a key press on the computer keyboard does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    TogglePlay,
    Drum(TrackId),
    /// Index into the piano row, 0..18
    PianoKey(u8),
    OctaveDown,
    OctaveUp,
}

const PIANO_KEYS: [char; 18] = [
    'a', 'w', 's', 'e', 'd', 'f', 't', 'g', 'y', 'h', 'u', 'j', 'k', 'o', 'l', 'p', ';', '\'',
];

pub fn key_action(key: char) -> Option<KeyAction> {
    let key = key.to_ascii_lowercase();
    let action = match key {
        ' ' => KeyAction::TogglePlay,
        'c' => KeyAction::Drum(TrackId::Kick),
        'v' => KeyAction::Drum(TrackId::Snare),
        'b' => KeyAction::Drum(TrackId::HiHat),
        'n' => KeyAction::Drum(TrackId::Resonator),
        'm' => KeyAction::Drum(TrackId::Live),
        'z' => KeyAction::OctaveDown,
        'x' => KeyAction::OctaveUp,
        other => {
            let index = PIANO_KEYS.iter().position(|k| *k == other)?;
            KeyAction::PianoKey(index as u8)
        }
    };
    Some(action)
}

/// Computer-keyboard piano with an octave shift
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PianoKeyboard {
    octave_offset: i8,
}

impl PianoKeyboard {
    pub const MAX_OCTAVE_SHIFT: i8 = 2;

    pub fn octave_offset(&self) -> i8 {
        self.octave_offset
    }

    pub fn shift_octave(&mut self, delta: i8) -> i8 {
        self.octave_offset = (self.octave_offset + delta)
            .clamp(-Self::MAX_OCTAVE_SHIFT, Self::MAX_OCTAVE_SHIFT);
        self.octave_offset
    }

    pub fn note_for_index(&self, index: u8) -> u8 {
        let note = PITCHED_NOTE_FLOOR as i16 + 12 * self.octave_offset as i16 + index as i16;
        note.clamp(0, 127) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_table() {
        assert_eq!(route_note(36), NoteRoute::Drum(TrackId::Kick));
        assert_eq!(route_note(38), NoteRoute::Drum(TrackId::Snare));
        assert_eq!(route_note(42), NoteRoute::Drum(TrackId::HiHat));
        assert_eq!(route_note(46), NoteRoute::Drum(TrackId::Resonator));
        assert_eq!(route_note(48), NoteRoute::Pitched(48));
        assert_eq!(route_note(100), NoteRoute::Pitched(100));
        assert_eq!(route_note(37), NoteRoute::Unmapped);
        assert_eq!(route_note(47), NoteRoute::Unmapped);
    }

    #[test]
    fn test_midi_parse() {
        assert_eq!(
            MidiMessage::parse(&[0x91, 60, 127]),
            Some(MidiMessage::NoteOn { note: 60, velocity: 1.0 })
        );
        assert_eq!(MidiMessage::parse(&[0x90, 60, 0]), Some(MidiMessage::NoteOff { note: 60 }));
        assert_eq!(MidiMessage::parse(&[0x80, 61, 64]), Some(MidiMessage::NoteOff { note: 61 }));
        assert_eq!(MidiMessage::parse(&[0xb0, 1, 64]), None);
        assert_eq!(MidiMessage::parse(&[0x90, 60]), None);
    }

    #[test]
    fn test_keyboard_table() {
        assert_eq!(key_action(' '), Some(KeyAction::TogglePlay));
        assert_eq!(key_action('C'), Some(KeyAction::Drum(TrackId::Kick)));
        assert_eq!(key_action('m'), Some(KeyAction::Drum(TrackId::Live)));
        assert_eq!(key_action('a'), Some(KeyAction::PianoKey(0)));
        assert_eq!(key_action('\''), Some(KeyAction::PianoKey(17)));
        assert_eq!(key_action('q'), None);
    }

    #[test]
    fn test_octave_shift_is_bounded() {
        let mut keys = PianoKeyboard::default();
        assert_eq!(keys.note_for_index(0), 48);
        for _ in 0..5 {
            keys.shift_octave(1);
        }
        assert_eq!(keys.octave_offset(), 2);
        assert_eq!(keys.note_for_index(3), 75);
        for _ in 0..9 {
            keys.shift_octave(-1);
        }
        assert_eq!(keys.octave_offset(), -2);
        assert_eq!(keys.note_for_index(0), 24);
    }
}
