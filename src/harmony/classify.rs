//! Template matching of aggregated pitch-class energy.

use crate::analysis::result::{ChordSegment, NO_CHORD};
use crate::audio::chroma::{self, PitchClassVector};
use crate::audio::spectrum::frames_to_time;

use super::templates::TemplateBank;

/// Averaged vectors with a smaller norm are treated as silence.
pub const SILENCE_THRESHOLD: f32 = 0.05;
/// Score multiplier for the template that labeled the previous segment.
pub const PERSISTENCE_BIAS: f32 = 1.2;

/// Maps frame indices to seconds for one analyzed signal.
#[derive(Clone, Copy, Debug)]
pub struct FrameClock {
    pub sample_rate: u32,
    pub hop_length: usize,
    pub duration: f32,
}

impl FrameClock {
    pub fn time(&self, frame: usize) -> f32 {
        frames_to_time(frame, self.sample_rate, self.hop_length).min(self.duration)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    /// Index into the template bank, `None` for silence.
    pub template: Option<usize>,
    pub label: String,
    pub confidence: f32,
}

impl Classification {
    fn silence() -> Self {
        Self {
            template: None,
            label: NO_CHORD.to_string(),
            confidence: 0.0,
        }
    }
}

/// Argmax over `scores` after boosting `previous`; the first maximum wins ties.
pub fn select(scores: &[f32], previous: Option<usize>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &raw) in scores.iter().enumerate() {
        let score = if Some(i) == previous {
            raw * PERSISTENCE_BIAS
        } else {
            raw
        };
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

/// Classify one averaged (not yet normalized) pitch-class vector.
pub fn classify_vector(
    averaged: &PitchClassVector,
    previous: Option<usize>,
    bank: &TemplateBank,
) -> Classification {
    if chroma::norm(averaged) < SILENCE_THRESHOLD {
        return Classification::silence();
    }
    let mut unit = *averaged;
    chroma::normalize(&mut unit);

    let scores: Vec<f32> = bank.templates().iter().map(|t| t.score(&unit)).collect();
    let Some(index) = select(&scores, previous) else {
        return Classification::silence();
    };
    let template = &bank.templates()[index];
    Classification {
        template: Some(index),
        label: template.name.clone(),
        // unbiased similarity
        confidence: scores[index].clamp(0.0, 1.0),
    }
}

/// One segment per boundary interval, with persistence bias between neighbours.
pub fn segment_chords(
    chroma: &[PitchClassVector],
    boundaries: &[usize],
    clock: &FrameClock,
    bank: &TemplateBank,
) -> Vec<ChordSegment> {
    let mut segments: Vec<ChordSegment> = Vec::new();
    let mut previous: Option<usize> = None;

    for pair in boundaries.windows(2) {
        let (s, e) = (pair[0], pair[1]);
        if e <= s {
            continue;
        }
        let start = clock.time(s);
        let end = clock.time(e);
        if end <= start {
            continue;
        }

        let lo = s.min(chroma.len());
        let hi = e.min(chroma.len());
        let averaged = chroma::mean(&chroma[lo..hi]);
        let result = classify_vector(&averaged, previous, bank);

        segments.push(ChordSegment::new(start, end, result.label, result.confidence));
        previous = result.template;
    }

    if let Some(last) = segments.last_mut() {
        last.end = clock.duration;
    }

    log::debug!("Classified {} raw segments", segments.len());
    segments
}

/// Single-window variant for short live buffers: no bias, no smoothing.
pub fn classify_window(chroma: &[PitchClassVector], bank: &TemplateBank) -> Classification {
    classify_vector(&chroma::mean(chroma), None, bank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmony::templates::ChordQuality;

    fn clock(duration: f32) -> FrameClock {
        // 10 frames per second
        FrameClock {
            sample_rate: 5120,
            hop_length: 512,
            duration,
        }
    }

    #[test]
    fn exact_template_is_recognized_with_full_confidence() {
        let bank = TemplateBank::global();
        let c = bank.lookup(0, ChordQuality::Major).vector;
        let result = classify_vector(&c, None, bank);
        assert_eq!(result.label, "C");
        assert!((result.confidence - 1.0).abs() < 1e-4);
    }

    #[test]
    fn quiet_vector_is_no_chord() {
        let bank = TemplateBank::global();
        let mut v = [0.0; 12];
        v[0] = 0.04;
        let result = classify_vector(&v, None, bank);
        assert_eq!(result.label, NO_CHORD);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.template, None);
    }

    #[test]
    fn bias_keeps_previous_label_when_close() {
        // unbiased winner is index 1 (0.88), but 0.85 * 1.2 = 1.02 wins for index 0
        assert_eq!(select(&[0.85, 0.88], None), Some(1));
        assert_eq!(select(&[0.85, 0.88], Some(0)), Some(0));
        // 0.9 * 1.2 = 1.08 > 0.85
        assert_eq!(select(&[0.9, 0.85], Some(0)), Some(0));
        // clear winners are not overridden
        assert_eq!(select(&[0.5, 0.88], Some(0)), Some(1));
    }

    #[test]
    fn ties_go_to_first_template() {
        assert_eq!(select(&[0.7, 0.7, 0.7], None), Some(0));
        assert_eq!(select(&[], None), None);
    }

    #[test]
    fn confidence_is_unbiased_similarity() {
        let bank = TemplateBank::global();
        let cmin = bank.position("Cmin").unwrap();
        let g = bank.lookup(7, ChordQuality::Major).vector;
        let result = classify_vector(&g, Some(cmin), bank);
        assert!(result.confidence <= 1.0);
        let expected = bank.templates()[result.template.unwrap()].score(&g);
        assert!((result.confidence - expected.min(1.0)).abs() < 1e-6);
    }

    #[test]
    fn segments_tile_the_duration() {
        let bank = TemplateBank::global();
        let cmin = bank.lookup(0, ChordQuality::Minor).vector;
        let g = bank.lookup(7, ChordQuality::Major).vector;
        let mut frames = vec![cmin; 10];
        frames.extend(vec![g; 10]);

        let segments = segment_chords(&frames, &[0, 10, 20], &clock(2.0), bank);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].end, segments[1].start);
        assert_eq!(segments[1].end, 2.0);
        assert_eq!(segments[0].chord, "Cmin");
        assert_eq!(segments[1].chord, "G");
    }

    #[test]
    fn non_increasing_pairs_are_skipped() {
        let bank = TemplateBank::global();
        let c = bank.lookup(0, ChordQuality::Major).vector;
        let frames = vec![c; 20];
        let segments = segment_chords(&frames, &[0, 10, 10, 20], &clock(2.0), bank);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.end > s.start));
    }

    #[test]
    fn silent_frames_become_no_chord_segments() {
        let bank = TemplateBank::global();
        let frames = vec![[0.0; 12]; 20];
        let segments = segment_chords(&frames, &[0, 10, 20], &clock(2.0), bank);
        assert!(segments.iter().all(|s| s.chord == NO_CHORD && s.confidence == 0.0));
    }

    #[test]
    fn window_classification_ignores_history() {
        let bank = TemplateBank::global();
        let a_minor = bank.lookup(9, ChordQuality::Minor).vector;
        let result = classify_window(&[a_minor, a_minor], bank);
        assert_eq!(result.label, "Amin");
    }

    #[test]
    fn previous_segment_label_carries_bias_forward() {
        let bank = TemplateBank::global();
        let c_index = bank.position("C").unwrap();
        let c = bank.templates()[c_index].vector;
        let g = bank.lookup(7, ChordQuality::Major).vector;

        // C/G blends that lose to another template alone but keep C after a C segment
        let contested: Vec<PitchClassVector> = (0..=100)
            .map(|step| {
                let w = step as f32 / 100.0;
                let mut v = [0.0; 12];
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = w * c[i] + (1.0 - w) * g[i];
                }
                v
            })
            .filter(|v| {
                classify_vector(v, None, bank).label != "C"
                    && classify_vector(v, Some(c_index), bank).label == "C"
            })
            .collect();
        assert!(!contested.is_empty());
        let blend = contested[contested.len() / 2];

        let mut frames = vec![c; 10];
        frames.extend(vec![blend; 10]);
        let held = segment_chords(&frames, &[0, 10, 20], &clock(2.0), bank);
        assert_eq!(held.len(), 2);
        assert_eq!(held[0].chord, "C");
        assert_eq!(held[1].chord, "C");
        let unbiased = bank.templates()[c_index].score(&{
            let mut unit = blend;
            chroma::normalize(&mut unit);
            unit
        });
        assert!((held[1].confidence - unbiased).abs() < 1e-4);

        // after silence there is nothing to persist
        let mut frames = vec![[0.0; 12]; 10];
        frames.extend(vec![blend; 10]);
        let fresh = segment_chords(&frames, &[0, 10, 20], &clock(2.0), bank);
        assert_eq!(fresh[0].chord, NO_CHORD);
        assert_ne!(fresh[1].chord, "C");
    }
}
