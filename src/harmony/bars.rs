use crate::analysis::result::ChordSegment;

const MIN_BAR_SECS: f32 = 0.5;
const MAX_BAR_SECS: f32 = 12.0;
/// Bar length when the tempo is missing.
const DEFAULT_BAR_SECS: f32 = 2.0;

pub fn bar_length(tempo: f32, beats_per_bar: u32) -> f32 {
    let raw = if tempo > 0.0 {
        beats_per_bar.max(1) as f32 * 60.0 / tempo
    } else {
        DEFAULT_BAR_SECS
    };
    raw.clamp(MIN_BAR_SECS, MAX_BAR_SECS)
}

/// One chord per bar window over `[0, duration]`, chosen by largest overlap.
pub fn quantize_to_bars(
    segments: &[ChordSegment],
    tempo: f32,
    duration: f32,
    beats_per_bar: u32,
) -> Vec<ChordSegment> {
    if duration <= 0.0 {
        return segments.to_vec();
    }
    let bar = bar_length(tempo, beats_per_bar);

    let mut sorted: Vec<&ChordSegment> = segments.iter().collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut bars = Vec::new();
    let mut index = 0usize;
    loop {
        let start = index as f32 * bar;
        if start >= duration - 1e-6 {
            break;
        }
        let end = (start + bar).min(duration);

        let mut best: Option<(&ChordSegment, f32)> = None;
        for segment in &sorted {
            let overlap = segment.overlap(start, end);
            if overlap > best.map_or(0.0, |(_, o)| o) {
                best = Some((segment, overlap));
            }
        }

        bars.push(match best {
            Some((segment, _)) => ChordSegment::new(start, end, segment.chord.clone(), segment.confidence),
            None => ChordSegment::no_chord(start, end),
        });
        index += 1;
    }
    bars
}
