//! Tempo estimation and beat-aligned segment boundaries.
//!
//! Tempo comes from the autocorrelation of the onset envelope weighted by a
//! log-normal prior around 120 bpm. Beats are then placed by dynamic
//! programming: each beat is rewarded for onset strength and penalized for
//! deviating from the estimated period.

use super::onset::autocorrelation_at;
use super::spectrum::time_to_frames;

const MIN_BPM: f32 = 30.0;
const MAX_BPM: f32 = 300.0;
const PRIOR_BPM: f32 = 120.0;
const PRIOR_OCTAVES: f32 = 1.0;
const TIGHTNESS: f32 = 100.0;

/// Frame grid over which chroma is aggregated before classification.
#[derive(Clone, Debug, PartialEq)]
pub struct Boundaries {
    pub tempo: f32,
    /// Strictly increasing, starts at 0 and ends at the frame count.
    pub frames: Vec<usize>,
    /// True when beat tracking failed and a uniform grid was synthesized.
    pub synthetic: bool,
}

/// Tempo in bpm, or 0 when the envelope carries no periodicity.
pub fn estimate_tempo(envelope: &[f32], frame_rate: f32) -> f32 {
    if envelope.iter().all(|&v| v <= 0.0) || frame_rate <= 0.0 {
        return 0.0;
    }
    let min_lag = ((60.0 * frame_rate / MAX_BPM).floor() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / MIN_BPM).ceil() as usize).min(envelope.len().saturating_sub(1));

    let mut best_lag = 0usize;
    let mut best_score = 0.0f32;
    for lag in min_lag..=max_lag {
        let bpm = 60.0 * frame_rate / lag as f32;
        let prior = (-0.5 * ((bpm / PRIOR_BPM).log2() / PRIOR_OCTAVES).powi(2)).exp();
        let score = autocorrelation_at(envelope, lag) * prior;
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }

    if best_lag == 0 {
        return 0.0;
    }
    60.0 * frame_rate / best_lag as f32
}

/// Beat frame indices for an envelope at the given tempo.
pub fn track_beats(envelope: &[f32], frame_rate: f32, tempo: f32) -> Vec<usize> {
    if tempo <= 0.0 || envelope.len() < 2 {
        return Vec::new();
    }
    let period = 60.0 * frame_rate / tempo;
    if period < 1.0 {
        return Vec::new();
    }

    let local = local_score(envelope, period);
    let n = local.len();
    let mut cumulative = vec![0.0f32; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];

    let max_back = (2.0 * period).round() as usize;
    let min_back = ((period / 2.0).round() as usize).max(1);

    for i in 0..n {
        let mut best: Option<(usize, f32)> = None;
        if i >= min_back {
            let lo = i.saturating_sub(max_back);
            for prev in lo..=(i - min_back) {
                let gap = (i - prev) as f32;
                let penalty = -TIGHTNESS * (gap / period).ln().powi(2);
                let candidate = cumulative[prev] + penalty;
                if best.map_or(true, |(_, s)| candidate > s) {
                    best = Some((prev, candidate));
                }
            }
        }
        match best {
            Some((prev, score)) => {
                cumulative[i] = local[i] + score;
                backlink[i] = Some(prev);
            }
            None => cumulative[i] = local[i],
        }
    }

    let Some(last) = last_beat(&cumulative) else {
        return Vec::new();
    };

    let mut beats = vec![last];
    let mut cursor = last;
    while let Some(prev) = backlink[cursor] {
        beats.push(prev);
        cursor = prev;
    }
    beats.reverse();
    beats
}

/// Onset envelope smoothed by a Gaussian of width ~one period, normalized by its std.
fn local_score(envelope: &[f32], period: f32) -> Vec<f32> {
    let n = envelope.len() as f32;
    let mean = envelope.iter().sum::<f32>() / n;
    let std = (envelope.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
    let scale = if std > 0.0 { std } else { 1.0 };

    let radius = period.round() as isize;
    let kernel: Vec<f32> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f32 * 32.0 / period).powi(2)).exp())
        .collect();

    (0..envelope.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, w)| {
                    let idx = i + j as isize - radius;
                    (idx >= 0 && (idx as usize) < envelope.len())
                        .then(|| w * envelope[idx as usize] / scale)
                })
                .sum()
        })
        .collect()
}

/// Last local maximum of the cumulative score that is at least half the median peak.
fn last_beat(cumulative: &[f32]) -> Option<usize> {
    let n = cumulative.len();
    let is_peak = |i: usize| {
        let left = i == 0 || cumulative[i] > cumulative[i - 1];
        let right = i + 1 == n || cumulative[i] >= cumulative[i + 1];
        left && right
    };
    let mut peaks: Vec<f32> = (0..n).filter(|&i| is_peak(i)).map(|i| cumulative[i]).collect();
    if peaks.is_empty() {
        return None;
    }
    peaks.sort_by(|a, b| a.total_cmp(b));
    let threshold = 0.5 * peaks[peaks.len() / 2];
    (0..n).rev().find(|&i| is_peak(i) && cumulative[i] >= threshold)
}

/// Beat-aligned boundaries, or a uniform `fallback_step` grid when fewer than two beats are found.
pub fn boundaries(
    envelope: &[f32],
    n_frames: usize,
    sample_rate: u32,
    hop_length: usize,
    fallback_step: f32,
) -> Boundaries {
    let frame_rate = sample_rate as f32 / hop_length as f32;
    let tempo = estimate_tempo(envelope, frame_rate);
    let beats = track_beats(envelope, frame_rate, tempo);

    log::debug!("Beat tracking: tempo={:.1} bpm, {} beats", tempo, beats.len());

    if beats.len() < 2 {
        let step = time_to_frames(fallback_step, sample_rate, hop_length).max(1);
        log::info!("Fewer than two beats; using a uniform {}-frame grid", step);
        let frames = (0..n_frames).step_by(step).collect();
        return Boundaries {
            tempo,
            frames: close_grid(frames, n_frames),
            synthetic: true,
        };
    }

    Boundaries {
        tempo,
        frames: close_grid(beats, n_frames),
        synthetic: false,
    }
}

/// Clip to `[0, n_frames]`, add both ends, drop duplicates.
fn close_grid(mut frames: Vec<usize>, n_frames: usize) -> Vec<usize> {
    frames.retain(|&f| f < n_frames);
    frames.push(0);
    frames.push(n_frames);
    frames.sort_unstable();
    frames.dedup();
    frames
}
