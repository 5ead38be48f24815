//! Coarse chord vocabulary for the simplified view.
//!
//! Every label collapses to one of four buckets: major (bare root), `min`,
//! `dim` or `aug`. Sevenths, sixths and suspensions fold into their triad.

use crate::analysis::result::NO_CHORD;

/// Split a label into its root (`C`, `C#`, `Db`) and quality suffix.
pub fn split_root(label: &str) -> Option<(&str, &str)> {
    let mut chars = label.char_indices();
    let (_, first) = chars.next()?;
    if !('A'..='G').contains(&first) {
        return None;
    }
    let root_len = match chars.next() {
        Some((_, '#')) | Some((_, 'b')) => 2,
        _ => 1,
    };
    Some(label.split_at(root_len))
}

pub fn simplify(label: &str) -> String {
    let Some((root, suffix)) = split_root(label) else {
        return NO_CHORD.to_string();
    };

    let bucket = if suffix.starts_with("dim") {
        "dim"
    } else if suffix.starts_with("aug") {
        "aug"
    } else if suffix.starts_with("min") || (suffix.starts_with('m') && !suffix.starts_with("maj")) {
        "min"
    } else {
        ""
    };
    format!("{}{}", root, bucket)
}
