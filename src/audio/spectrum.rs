use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

/// Magnitude STFT, one row per frame. Frames are centered: frame `t` covers
/// samples around `t * hop_length`, with zero padding at both ends.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub fft_size: usize,
    pub hop_length: usize,
}

impl Spectrogram {
    /// Compute the magnitude spectrogram, keeping at most `max_bins` bins per frame.
    pub fn compute(
        samples: &[f32],
        sample_rate: u32,
        fft_size: usize,
        hop_length: usize,
        max_bins: usize,
    ) -> Self {
        let n_frames = frame_count(samples.len(), hop_length);
        let n_bins = max_bins.min(fft_size / 2 + 1);
        let half = fft_size / 2;
        let hann = hann_window(fft_size);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        let frames = (0..n_frames)
            .into_par_iter()
            .map(|t| {
                let center = t * hop_length;
                let mut buffer = vec![Complex::new(0.0f32, 0.0); fft_size];
                for (i, slot) in buffer.iter_mut().enumerate() {
                    let idx = (center + i).checked_sub(half);
                    if let Some(&s) = idx.and_then(|idx| samples.get(idx)) {
                        *slot = Complex::new(s * hann[i], 0.0);
                    }
                }
                fft.process(&mut buffer);
                buffer[..n_bins].iter().map(|c| c.norm()).collect()
            })
            .collect();

        Self {
            frames,
            sample_rate,
            fft_size,
            hop_length,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn n_bins(&self) -> usize {
        self.frames.first().map_or(0, Vec::len)
    }

    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.fft_size as f32
    }
}

/// Number of centered analysis frames for a signal of `len` samples.
pub fn frame_count(len: usize, hop_length: usize) -> usize {
    if len == 0 || hop_length == 0 {
        return 0;
    }
    1 + len / hop_length
}

pub fn frames_to_time(frame: usize, sample_rate: u32, hop_length: usize) -> f32 {
    (frame * hop_length) as f32 / sample_rate as f32
}

pub fn time_to_frames(seconds: f32, sample_rate: u32, hop_length: usize) -> usize {
    (seconds * sample_rate as f32 / hop_length as f32).floor().max(0.0) as usize
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

/// Median of each length-`window` neighbourhood along a sequence (edges use the
/// truncated window).
pub fn median_filter(values: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || values.len() < 2 {
        return values.to_vec();
    }
    let radius = window / 2;
    let mut scratch = Vec::with_capacity(window);
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(radius);
            let end = (i + radius + 1).min(values.len());
            scratch.clear();
            scratch.extend_from_slice(&values[start..end]);
            scratch.sort_by(|a, b| a.total_cmp(b));
            scratch[scratch.len() / 2]
        })
        .collect()
}
