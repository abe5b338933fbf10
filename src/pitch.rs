//! Frequency, MIDI and note-name conversions
//!
//! Octave convention: MIDI 60 is `C4`, MIDI 69 is `A4` at 440 Hz.

use std::collections::HashMap;

/// Reference pitch for MIDI 69
pub const A4_HZ: f64 = 440.0;
/// MIDI number of A4
pub const A4_MIDI: f64 = 69.0;

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

lazy_static::lazy_static! {
    static ref PITCH_CLASS: HashMap<char, i32> = {
        let mut m = HashMap::new();
        m.insert('c', 0);
        m.insert('d', 2);
        m.insert('e', 4);
        m.insert('f', 5);
        m.insert('g', 7);
        m.insert('a', 9);
        m.insert('b', 11);
        m
    };
}

/// A frequency labelled with its nearest equal-tempered note
#[derive(Debug, Clone, PartialEq)]
pub struct NoteLabel {
    pub name: String,
    pub midi: i32,
    /// Deviation from the note in cents, in `[-50, 50]`
    pub cents: f64,
}

/// Fractional MIDI number of a frequency
pub fn frequency_to_midi(freq: f64) -> f64 {
    A4_MIDI + 12.0 * (freq / A4_HZ).log2()
}

/// Frequency of a (possibly fractional) MIDI number
pub fn midi_to_frequency(midi: f64) -> f64 {
    A4_HZ * 2f64.powf((midi - A4_MIDI) / 12.0)
}

/// Semitones spanned by a frequency ratio (`ratio_to_midi(2.0) == 12`)
pub fn ratio_to_midi(ratio: f64) -> f64 {
    12.0 * ratio.log2()
}

/// Cents spanned by a frequency ratio
pub fn ratio_to_cents(ratio: f64) -> f64 {
    1200.0 * ratio.log2()
}

/// Note name with sharps, e.g. `C4`, `F#3`, `A-1`
pub fn midi_to_note_name(midi: i32) -> String {
    let pc = midi.rem_euclid(12) as usize;
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", SHARP_NAMES[pc], octave)
}

/// Parse a note name like `C4`, `c#4`, `Db3`, `fs2` or `bf-1`.
///
/// Accidentals: `#`/`s` raise, `b`/`f` lower (after the letter). A missing
/// octave defaults to 4.
pub fn note_name_to_midi(note: &str) -> Option<i32> {
    let lower = note.trim().to_lowercase();
    let mut chars = lower.chars().peekable();
    let letter = chars.next()?;
    let mut semis = *PITCH_CLASS.get(&letter)?;

    while let Some(&c) = chars.peek() {
        match c {
            '#' | 's' => semis += 1,
            'b' | 'f' => semis -= 1,
            _ => break,
        }
        chars.next();
    }

    let rest: String = chars.collect();
    let octave = if rest.is_empty() {
        4
    } else {
        rest.parse::<i32>().ok()?
    };
    Some((octave + 1) * 12 + semis)
}

/// Nearest equal-tempered note of a frequency
pub fn nearest_note(freq: f64) -> NoteLabel {
    let exact = frequency_to_midi(freq);
    let midi = exact.round() as i32;
    NoteLabel {
        name: midi_to_note_name(midi),
        midi,
        cents: (exact - midi as f64) * 100.0,
    }
}
