//! The [`Note`] data model and the semitone ↔ name ↔ white-key-index
//! conversions shared by every stage of the pipeline (spec.md §3).

use serde::{Deserialize, Serialize};

/// One of the two hands, or both (used by pre-processing before the split).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    /// Number of white keys the arm covers: 6 for the right hand (with the
    /// extended pinky slot), 5 for the left.
    pub fn span(self) -> u8 {
        match self {
            Hand::Right => 6,
            Hand::Left => 5,
        }
    }
}

/// The region a black key falls in, used for fingering lookup (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlackKeyRegion {
    /// C#/D#
    Region1,
    /// F#/G#/A#
    Region2,
}

/// An immutable note event: semitone 21..108 (A0..C8), start/duration in
/// seconds, velocity, and originating track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub semitone: u8,
    pub start: f64,
    pub duration: f64,
    pub velocity: u8,
    pub track: usize,
}

/// Lowest semitone on an 88-key piano (A0).
pub const SEMITONE_MIN: u8 = 21;
/// Highest semitone on an 88-key piano (C8).
pub const SEMITONE_MAX: u8 = 108;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const SOLFEGE_NAMES: [&str; 12] = [
    "do", "do#", "re", "re#", "mi", "fa", "fa#", "sol", "sol#", "la", "la#", "si",
];

/// Converts a MIDI semitone number to its note name and octave, e.g.
/// `60 -> ("C", 4)`. Octave numbering follows the MIDI convention where
/// middle C (60) is C4.
pub fn semitone_to_name(semitone: u8) -> (&'static str, i32) {
    let octave = (semitone as i32) / 12 - 1;
    let name = NOTE_NAMES[(semitone % 12) as usize];
    (name, octave)
}

/// Formats a semitone as `"C#4"`-style note name.
pub fn semitone_to_string(semitone: u8) -> String {
    let (name, octave) = semitone_to_name(semitone);
    format!("{name}{octave}")
}

/// Solfège syllable for a semitone (`do`, `re`, `mi`, ...), ignoring octave.
/// A display convenience carried over from the original implementation's
/// `get_solfege_name` (see SPEC_FULL.md §9).
pub fn semitone_to_solfege(semitone: u8) -> &'static str {
    SOLFEGE_NAMES[(semitone % 12) as usize]
}

impl Note {
    /// Solfège syllable for this note's pitch class, ignoring octave.
    pub fn solfege(&self) -> &'static str {
        semitone_to_solfege(self.semitone)
    }
}

/// Parses a note name such as `"C#4"`, `"Db3"`, `"B#4"` back into a semitone
/// number. Enharmonic spellings are normalised first (spec.md §4.2 step 1).
/// Returns `None` for malformed input or input outside the piano range.
pub fn name_to_semitone(name: &str) -> Option<u8> {
    let normalized = normalize_enharmonic(name);
    let bytes = normalized.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let letter = bytes[0].to_ascii_uppercase();
    let letter_class = match letter {
        b'C' => 0,
        b'D' => 2,
        b'E' => 4,
        b'F' => 5,
        b'G' => 7,
        b'A' => 9,
        b'B' => 11,
        _ => return None,
    };
    let mut idx = 1;
    let mut accidental = 0i32;
    while idx < bytes.len() && (bytes[idx] == b'#' || bytes[idx] == b'b') {
        accidental += if bytes[idx] == b'#' { 1 } else { -1 };
        idx += 1;
    }
    let octave: i32 = normalized[idx..].parse().ok()?;
    let pitch_class = (letter_class + accidental).rem_euclid(12);
    let semitone = (octave + 1) * 12 + pitch_class;
    if (SEMITONE_MIN as i32..=SEMITONE_MAX as i32).contains(&semitone) {
        Some(semitone as u8)
    } else {
        None
    }
}

/// Rewrites flats as sharps and resolves `B#`/`Cb`/`E#`/`Fb` (spec.md §4.2
/// step 1). Operates on note names, not semitones, so it can run before a
/// semitone is known.
pub fn normalize_enharmonic(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    let (letter_part, octave_part) = upper.split_at(
        upper
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .unwrap_or(upper.len()),
    );

    let normalized_letters = match letter_part {
        "B#" => "C".to_string(),
        "E#" => "F".to_string(),
        "CB" => "B".to_string(),
        "FB" => "E".to_string(),
        "DB" => "C#".to_string(),
        "EB" => "D#".to_string(),
        "GB" => "F#".to_string(),
        "AB" => "G#".to_string(),
        "BB" => "A#".to_string(),
        other => other.to_string(),
    };

    format!("{normalized_letters}{octave_part}")
}

/// Converts a semitone to its 1..52 white-key index (A0 = 1, C8 = 52).
/// Black keys share the index of the adjacent lower white key.
pub fn white_key_index(semitone: u8) -> u8 {
    let (name, octave) = semitone_to_name(semitone);
    let letter = name.chars().next().unwrap();
    let white_in_octave = match letter {
        'C' => 0,
        'D' => 1,
        'E' => 2,
        'F' => 3,
        'G' => 4,
        'A' => 5,
        'B' => 6,
        _ => unreachable!(),
    };

    // A0 = 1, B0 = 2, then each octave starting at C contributes 7 whites.
    if octave == 0 {
        return if letter == 'A' { 1 } else { 2 };
    }
    2 + (octave - 1) as u8 * 7 + white_in_octave + 1
}

/// True if the semitone falls on a black key.
pub fn is_black_key(semitone: u8) -> bool {
    matches!(semitone % 12, 1 | 3 | 6 | 8 | 10)
}

/// Black-key region, or `None` for white keys (spec.md §3).
pub fn black_key_region(semitone: u8) -> Option<BlackKeyRegion> {
    match semitone % 12 {
        1 | 3 => Some(BlackKeyRegion::Region1), // C#, D#
        6 | 8 | 10 => Some(BlackKeyRegion::Region2), // F#, G#, A#
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_full_range() {
        for semitone in SEMITONE_MIN..=SEMITONE_MAX {
            let s = semitone_to_string(semitone);
            let back = name_to_semitone(&s).unwrap_or_else(|| panic!("failed to re-parse {s}"));
            assert_eq!(back, semitone, "round trip broke for {semitone} -> {s}");
        }
    }

    #[test]
    fn note_solfege_matches_free_function() {
        let note = Note {
            semitone: 60,
            start: 0.0,
            duration: 0.5,
            velocity: 80,
            track: 0,
        };
        assert_eq!(note.solfege(), "do");
        assert_eq!(note.solfege(), semitone_to_solfege(note.semitone));
    }

    #[test]
    fn middle_c_is_60() {
        assert_eq!(semitone_to_string(60), "C4");
        assert_eq!(name_to_semitone("C4"), Some(60));
    }

    #[test]
    fn enharmonic_normalisation() {
        assert_eq!(normalize_enharmonic("Db4"), "C#4");
        assert_eq!(normalize_enharmonic("B#3"), "C3");
        assert_eq!(normalize_enharmonic("Cb4"), "B4");
        assert_eq!(normalize_enharmonic("Fb4"), "E4");
    }

    #[test]
    fn white_key_indices_match_spec_examples() {
        assert_eq!(white_key_index(21), 1); // A0
        assert_eq!(white_key_index(23), 2); // B0
        assert_eq!(white_key_index(60), 24); // C4
        assert_eq!(white_key_index(59), 23); // B3
        assert_eq!(white_key_index(107), 51); // B7
        assert_eq!(white_key_index(108), 52); // C8
    }

    #[test]
    fn black_keys_share_lower_white_index() {
        // C#4 (61) shares C4's white-key index (24).
        assert!(is_black_key(61));
        assert_eq!(white_key_index(61), white_key_index(60));
    }

    #[test]
    fn black_key_regions() {
        assert_eq!(black_key_region(61), Some(BlackKeyRegion::Region1)); // C#
        assert_eq!(black_key_region(63), Some(BlackKeyRegion::Region1)); // D#
        assert_eq!(black_key_region(66), Some(BlackKeyRegion::Region2)); // F#
        assert_eq!(black_key_region(68), Some(BlackKeyRegion::Region2)); // G#
        assert_eq!(black_key_region(70), Some(BlackKeyRegion::Region2)); // A#
        assert_eq!(black_key_region(60), None);
    }
}
