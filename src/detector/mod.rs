//! External pre-trained chord/key/tempo detectors and label mapping.

mod command;

pub use command::CommandSuite;

use std::path::Path;

use crate::analysis::result::{Scale, NO_CHORD};
use crate::audio::chroma::PITCH_CLASS_NAMES;
use crate::error::Result;
use crate::harmony::simplify::split_root;

/// `(start, end, label)` as produced by a chord detector, already in our vocabulary.
pub type RawChord = (f32, f32, String);

/// A suite of detectors that work directly on audio files.
pub trait DetectorSuite: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the suite can run on this host at all.
    fn is_available(&self) -> bool;

    fn detect_chords(&self, path: &Path) -> Result<Vec<RawChord>>;

    /// Raw key label, e.g. `"Bb minor"`.
    fn detect_key(&self, path: &Path) -> Result<String>;

    fn detect_tempo(&self, path: &Path) -> Result<f32>;
}

impl<T: DetectorSuite + ?Sized> DetectorSuite for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn detect_chords(&self, path: &Path) -> Result<Vec<RawChord>> {
        (**self).detect_chords(path)
    }

    fn detect_key(&self, path: &Path) -> Result<String> {
        (**self).detect_key(path)
    }

    fn detect_tempo(&self, path: &Path) -> Result<f32> {
        (**self).detect_tempo(path)
    }
}

/// Rewrite flats as their sharp equivalents (`Bb` -> `A#`).
pub fn sharp_root(root: &str) -> Option<&'static str> {
    let mut chars = root.chars();
    let letter = chars.next()?;
    let natural = PITCH_CLASS_NAMES.iter().position(|n| n.len() == 1 && n.starts_with(letter))?;
    let pc = match chars.as_str() {
        "" => natural,
        "#" => natural + 1,
        "b" => natural + 11,
        _ => return None,
    };
    Some(PITCH_CLASS_NAMES[pc % 12])
}

/// Map a `Root:quality` detector label onto our chord names.
pub fn map_chord_label(label: &str) -> String {
    let label = label.trim();
    let (root, quality) = label.split_once(':').unwrap_or((label, "maj"));
    let Some(root) = sharp_root(root) else {
        return NO_CHORD.to_string();
    };
    // strip inversions such as "maj/3"
    let quality = quality.split('/').next().unwrap_or_default();
    match quality {
        "maj" | "" => root.to_string(),
        other => format!("{}{}", root, other),
    }
}

/// Parse `"C major"`, `"A minor"`, `"Am"` or `"C"`; anything else is C major.
pub fn parse_key(raw: &str) -> (String, Scale) {
    let raw = raw.trim();
    let parsed = if let Some((root, mode)) = raw.split_once(char::is_whitespace) {
        let scale = match mode.trim().to_ascii_lowercase().as_str() {
            "major" | "maj" => Some(Scale::Major),
            "minor" | "min" => Some(Scale::Minor),
            _ => None,
        };
        scale.and_then(|s| sharp_root(root).map(|r| (r, s)))
    } else {
        split_root(raw).and_then(|(root, suffix)| {
            let scale = match suffix {
                "" => Some(Scale::Major),
                "m" | "min" => Some(Scale::Minor),
                _ => None,
            };
            scale.and_then(|s| sharp_root(root).map(|r| (r, s)))
        })
    };

    match parsed {
        Some((root, scale)) => (root.to_string(), scale),
        None => {
            log::warn!("Unrecognized key label {:?}; using C major", raw);
            ("C".to_string(), Scale::Major)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_labels() {
        assert_eq!(map_chord_label("C:maj"), "C");
        assert_eq!(map_chord_label("A:min"), "Amin");
        assert_eq!(map_chord_label("Bb:maj"), "A#");
        assert_eq!(map_chord_label("Db:min7"), "C#min7");
        assert_eq!(map_chord_label("G:7"), "G7");
        assert_eq!(map_chord_label("E:maj/3"), "E");
        assert_eq!(map_chord_label("N"), NO_CHORD);
        assert_eq!(map_chord_label("X"), NO_CHORD);
        assert_eq!(map_chord_label("F#"), "F#");
    }

    #[test]
    fn flats_become_sharps() {
        assert_eq!(sharp_root("Cb"), Some("B"));
        assert_eq!(sharp_root("E#"), Some("F"));
        assert_eq!(sharp_root("H"), None);
        assert_eq!(sharp_root("Cx"), None);
    }

    #[test]
    fn key_labels() {
        assert_eq!(parse_key("C major"), ("C".to_string(), Scale::Major));
        assert_eq!(parse_key("Bb minor"), ("A#".to_string(), Scale::Minor));
        assert_eq!(parse_key("Am"), ("A".to_string(), Scale::Minor));
        assert_eq!(parse_key("F#"), ("F#".to_string(), Scale::Major));
        assert_eq!(parse_key("gibberish"), ("C".to_string(), Scale::Major));
        assert_eq!(parse_key("D dorian"), ("C".to_string(), Scale::Major));
    }
}
