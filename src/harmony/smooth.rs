//! Segment smoothing: merge repeated labels, absorb segments that are too short.

use crate::analysis::result::ChordSegment;

/// Merge consecutive segments with identical labels, keeping the higher confidence.
pub fn merge_consecutive(segments: &[ChordSegment]) -> Vec<ChordSegment> {
    let mut merged: Vec<ChordSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(current) if current.chord == segment.chord => {
                current.end = segment.end;
                current.confidence = current.confidence.max(segment.confidence);
            }
            _ => merged.push(segment.clone()),
        }
    }
    merged
}

/// Merge duplicates, then fold every segment shorter than `min_duration` into a neighbour.
///
/// Interior and trailing short segments extend the previous kept segment; a
/// short leading segment hands its start time to the segment after it.
pub fn smooth(segments: &[ChordSegment], min_duration: f32) -> Vec<ChordSegment> {
    let mut merged = merge_consecutive(segments);
    if merged.len() < 2 {
        return merged;
    }

    let mut kept: Vec<ChordSegment> = Vec::with_capacity(merged.len());
    let last = merged.len() - 1;
    for i in 0..merged.len() {
        let current = merged[i].clone();
        if current.duration() >= min_duration {
            kept.push(current);
            continue;
        }
        match kept.last_mut() {
            Some(previous) => previous.end = current.end,
            None if i < last => merged[i + 1].start = current.start,
            // nothing kept and nothing after: keep it rather than drop the span
            None => kept.push(current),
        }
    }

    // absorbing can leave equal labels side by side
    merge_consecutive(&kept)
}
