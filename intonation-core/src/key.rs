//! # Key Classification
//!
//! Answers whether a pitch class is diatonic in one of the supported major keys.
//! Spellings are normalised to sharps before the lookup, so "Bb", "A#" and even
//! theoretical names like "Cb" or "E#" resolve to the same scale degree.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::tuning::NOTE_NAMES;

/// The major keys a session can be classified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum KeySignature {
    C,
    G,
    #[default]
    D,
    A,
    E,
    B,
    F,
    Bb,
    Eb,
    Ab,
}

impl KeySignature {
    pub const ALL: [KeySignature; 10] = [
        KeySignature::C,
        KeySignature::G,
        KeySignature::D,
        KeySignature::A,
        KeySignature::E,
        KeySignature::B,
        KeySignature::F,
        KeySignature::Bb,
        KeySignature::Eb,
        KeySignature::Ab,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KeySignature::C => "C",
            KeySignature::G => "G",
            KeySignature::D => "D",
            KeySignature::A => "A",
            KeySignature::E => "E",
            KeySignature::B => "B",
            KeySignature::F => "F",
            KeySignature::Bb => "Bb",
            KeySignature::Eb => "Eb",
            KeySignature::Ab => "Ab",
        }
    }

    /// The seven scale degrees, spelled as they appear in the key signature.
    pub fn scale(self) -> &'static [&'static str; 7] {
        &MAJOR_SCALES[&self]
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeySignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeySignature::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidConfig(format!("unsupported key '{}'", s)))
    }
}

static MAJOR_SCALES: Lazy<BTreeMap<KeySignature, [&'static str; 7]>> = Lazy::new(|| {
    BTreeMap::from([
        (KeySignature::C, ["C", "D", "E", "F", "G", "A", "B"]),
        (KeySignature::G, ["G", "A", "B", "C", "D", "E", "F#"]),
        (KeySignature::D, ["D", "E", "F#", "G", "A", "B", "C#"]),
        (KeySignature::A, ["A", "B", "C#", "D", "E", "F#", "G#"]),
        (KeySignature::E, ["E", "F#", "G#", "A", "B", "C#", "D#"]),
        (KeySignature::B, ["B", "C#", "D#", "E", "F#", "G#", "A#"]),
        (KeySignature::F, ["F", "G", "A", "Bb", "C", "D", "E"]),
        (KeySignature::Bb, ["Bb", "C", "D", "Eb", "F", "G", "A"]),
        (KeySignature::Eb, ["Eb", "F", "G", "Ab", "Bb", "C", "D"]),
        (KeySignature::Ab, ["Ab", "Bb", "C", "Db", "Eb", "F", "G"]),
    ])
});

/// Scale membership as pitch-class bitmasks (bit `n` = `NOTE_NAMES[n]`).
static SCALE_MASKS: Lazy<BTreeMap<KeySignature, u16>> = Lazy::new(|| {
    MAJOR_SCALES
        .iter()
        .map(|(key, degrees)| {
            let mask = degrees
                .iter()
                .filter_map(|pc| pitch_class_index(pc))
                .fold(0u16, |acc, idx| acc | (1 << idx));
            (*key, mask)
        })
        .collect()
});

/// Rewrites flats and theoretical spellings to the sharp spelling used by
/// [`NOTE_NAMES`]. Unknown input is returned unchanged.
pub fn normalize_pitch_class(pc: &str) -> &str {
    match pc {
        "Bb" => "A#",
        "Eb" => "D#",
        "Ab" => "G#",
        "Db" => "C#",
        "Gb" => "F#",
        "Cb" => "B",
        "Fb" => "E",
        "E#" => "F",
        "B#" => "C",
        other => other,
    }
}

fn pitch_class_index(pc: &str) -> Option<usize> {
    let normalized = normalize_pitch_class(pc);
    NOTE_NAMES.iter().position(|&n| n == normalized)
}

/// Whether `pitch_class` belongs to the major scale of `key`.
pub fn is_in_key(pitch_class: &str, key: KeySignature) -> bool {
    match pitch_class_index(pitch_class.trim()) {
        Some(idx) => SCALE_MASKS[&key] & (1 << idx) != 0,
        None => false,
    }
}

/// Whether the pitch class of a rounded MIDI number belongs to `key`.
pub fn is_midi_in_key(midi_rounded: i32, key: KeySignature) -> bool {
    SCALE_MASKS[&key] & (1 << midi_rounded.rem_euclid(12)) != 0
}
