//! # Musical Tuning Module
//!
//! Equal-temperament conversions between frequency, MIDI number, note label and
//! cent deviation. Every conversion takes the reference pitch explicitly, so a
//! session tuned to A4 = 442 Hz gets targets and cents relative to 442 Hz.

/// Pitch class names using sharps, indexed by `midi % 12`.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A rounded note: pitch class, octave and MIDI number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteName {
    /// Pitch class (e.g. "C#")
    pub name: &'static str,
    /// Scientific octave number (C4 is middle C)
    pub octave: i32,
    /// The MIDI number the note was rounded to
    pub midi_rounded: i32,
}

impl NoteName {
    /// Label with octave, e.g. "A4" or "C#3".
    pub fn label(&self) -> String {
        format!("{}{}", self.name, self.octave)
    }
}

/// Converts a frequency to a continuous MIDI number, where 69 is A at `a_ref`.
pub fn freq_to_midi(freq: f64, a_ref: f64) -> f64 {
    69.0 + 12.0 * (freq / a_ref).log2()
}

/// Equal-temperament frequency of a (possibly fractional) MIDI number.
pub fn midi_to_freq(midi: f64, a_ref: f64) -> f64 {
    a_ref * 2.0_f64.powf((midi - 69.0) / 12.0)
}

/// Rounds a continuous MIDI number to the nearest semitone and names it.
///
/// Halfway values round away from zero.
pub fn midi_to_name(midi: f64) -> NoteName {
    note_from_rounded(midi.round() as i32)
}

/// Names an already rounded MIDI number.
pub fn note_from_rounded(midi_rounded: i32) -> NoteName {
    NoteName {
        name: NOTE_NAMES[midi_rounded.rem_euclid(12) as usize],
        octave: midi_rounded.div_euclid(12) - 1,
        midi_rounded,
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat; 100 cents is one semitone.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

/// Removes a trailing octave number from a note label ("C#4" -> "C#", "B-1" -> "B").
pub fn strip_octave(label: &str) -> &str {
    let trimmed = label.trim_end_matches(|c: char| c.is_ascii_digit());
    trimmed.strip_suffix('-').unwrap_or(trimmed)
}

/// Everything the segmenters need to know about one accepted pitch.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchTarget {
    /// Label of the nearest note to the measured pitch
    pub detected_label: String,
    /// Label of the equal-temperament target note
    pub target_label: String,
    pub midi_rounded: i32,
    pub target_frequency_hz: f64,
    /// Signed offset of the measured frequency from the target
    pub cents: f64,
}

/// Maps a measured frequency onto its nearest equal-temperament note.
pub fn nearest_target(freq: f64, a_ref: f64) -> PitchTarget {
    let detected = midi_to_name(freq_to_midi(freq, a_ref));
    let target_frequency_hz = midi_to_freq(detected.midi_rounded as f64, a_ref);
    let target = note_from_rounded(detected.midi_rounded);
    PitchTarget {
        detected_label: detected.label(),
        target_label: target.label(),
        midi_rounded: detected.midi_rounded,
        target_frequency_hz,
        cents: calculate_cents_deviation(freq, target_frequency_hz),
    }
}
