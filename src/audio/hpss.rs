//! Harmonic-percussive separation by median filtering.
//!
//! Sustained tones form horizontal ridges in a spectrogram and drum hits form
//! vertical ones. Median filtering along time keeps the former, along frequency
//! keeps the latter; a soft Wiener-style mask then splits the original magnitudes.

use rayon::prelude::*;

use super::spectrum::{median_filter, Spectrogram};

const KERNEL: usize = 17;
const MASK_POWER: i32 = 2;

/// Return only the harmonic part of `spec`.
pub fn harmonic(spec: &Spectrogram) -> Spectrogram {
    let n_frames = spec.len();
    let n_bins = spec.n_bins();
    if n_frames == 0 || n_bins == 0 {
        return spec.clone();
    }

    // Median along time, computed per bin then transposed back.
    let along_time: Vec<Vec<f32>> = (0..n_bins)
        .into_par_iter()
        .map(|bin| {
            let column: Vec<f32> = spec.frames.iter().map(|frame| frame[bin]).collect();
            median_filter(&column, KERNEL)
        })
        .collect();

    let frames = spec
        .frames
        .par_iter()
        .enumerate()
        .map(|(t, frame)| {
            let percussive = median_filter(frame, KERNEL);
            frame
                .iter()
                .enumerate()
                .map(|(bin, &mag)| {
                    let h = along_time[bin][t].powi(MASK_POWER);
                    let p = percussive[bin].powi(MASK_POWER);
                    let total = h + p;
                    if total <= f32::EPSILON {
                        0.0
                    } else {
                        mag * h / total
                    }
                })
                .collect()
        })
        .collect();

    log::debug!("HPSS: {} frames x {} bins", n_frames, n_bins);

    Spectrogram {
        frames,
        sample_rate: spec.sample_rate,
        fft_size: spec.fft_size,
        hop_length: spec.hop_length,
    }
}
