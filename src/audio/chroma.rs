//! Pitch-class energy features.
//!
//! FFT bins are folded onto equal-tempered semitones between C2 and C7. Each
//! semitone's energy is the weighted mean of the bins that fall inside it, so
//! dense high-frequency regions do not outweigh sparse low ones (constant-Q
//! behaviour on top of a linear STFT).

use super::decode::AudioData;
use super::hpss;
use super::spectrum::{median_filter, Spectrogram};

pub const PITCH_CLASSES: usize = 12;
pub const PITCH_CLASS_NAMES: [&str; PITCH_CLASSES] =
    ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// 12 non-negative energies, index 0 = C.
pub type PitchClassVector = [f32; PITCH_CLASSES];

const MIN_MIDI: f32 = 36.0; // C2
const MAX_MIDI: f32 = 96.0; // C7
const A4_FREQ: f32 = 440.0;
const SILENCE_NORM: f32 = 1e-8;

#[derive(Clone, Debug)]
pub struct ChromaConfig {
    pub fft_size: usize,
    pub hop_length: usize,
    pub median_window: usize,
    /// Run harmonic-percussive separation before folding.
    pub separate_harmonic: bool,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            hop_length: 512,
            median_window: 3,
            separate_harmonic: true,
        }
    }
}

/// Fold each FFT bin onto its nearest semitone with a triangular weight.
struct SemitoneMap {
    /// (semitone index from MIN_MIDI, weight) per bin
    bins: Vec<Option<(usize, f32)>>,
    /// Total weight per semitone, for averaging
    totals: Vec<f32>,
}

impl SemitoneMap {
    fn new(sample_rate: u32, fft_size: usize) -> Self {
        let n_semitones = (MAX_MIDI - MIN_MIDI) as usize + 1;
        let max_bin = max_bin_for(sample_rate, fft_size);
        let mut totals = vec![0.0f32; n_semitones];
        let bins = (0..max_bin)
            .map(|bin| {
                let freq = bin as f32 * sample_rate as f32 / fft_size as f32;
                if freq <= 0.0 {
                    return None;
                }
                let midi = 69.0 + 12.0 * (freq / A4_FREQ).log2();
                let nearest = midi.round();
                if !(MIN_MIDI..=MAX_MIDI).contains(&nearest) {
                    return None;
                }
                let weight = 1.0 - (midi - nearest).abs();
                let idx = (nearest - MIN_MIDI) as usize;
                totals[idx] += weight;
                Some((idx, weight))
            })
            .collect();
        Self { bins, totals }
    }

    fn fold(&self, magnitudes: &[f32]) -> PitchClassVector {
        let mut semitones = vec![0.0f32; self.totals.len()];
        for (bin, &mag) in magnitudes.iter().enumerate() {
            if let Some(Some((idx, weight))) = self.bins.get(bin) {
                semitones[*idx] += weight * mag * mag;
            }
        }
        let mut chroma = [0.0f32; PITCH_CLASSES];
        for (idx, energy) in semitones.iter().enumerate() {
            let total = self.totals[idx];
            if total > 0.0 {
                let midi = MIN_MIDI as usize + idx;
                chroma[midi % PITCH_CLASSES] += energy / total;
            }
        }
        chroma
    }
}

/// Number of FFT bins that can reach the top of the semitone range.
fn max_bin_for(sample_rate: u32, fft_size: usize) -> usize {
    let top = A4_FREQ * 2f32.powf((MAX_MIDI + 0.5 - 69.0) / 12.0);
    let bin = (top * fft_size as f32 / sample_rate as f32).ceil() as usize + 1;
    bin.min(fft_size / 2 + 1)
}

/// Extract one unit-norm (or all-zero) pitch-class vector per analysis frame.
pub fn extract(audio: &AudioData, config: &ChromaConfig) -> Vec<PitchClassVector> {
    if audio.samples.is_empty() {
        return Vec::new();
    }

    let max_bin = max_bin_for(audio.sample_rate, config.fft_size);
    // Frequency-direction median needs a few bins of headroom above the range.
    let spec = Spectrogram::compute(
        &audio.samples,
        audio.sample_rate,
        config.fft_size,
        config.hop_length,
        max_bin + 16,
    );
    let spec = if config.separate_harmonic {
        hpss::harmonic(&spec)
    } else {
        spec
    };

    let map = SemitoneMap::new(audio.sample_rate, config.fft_size);
    let mut chroma: Vec<PitchClassVector> = spec.frames.iter().map(|f| map.fold(f)).collect();

    smooth_over_time(&mut chroma, config.median_window);
    for column in chroma.iter_mut() {
        normalize(column);
    }

    log::debug!("Chroma: {} frames", chroma.len());
    chroma
}

/// Per-pitch-class median filter across time.
pub fn smooth_over_time(chroma: &mut [PitchClassVector], window: usize) {
    if window <= 1 || chroma.len() < 2 {
        return;
    }
    for pc in 0..PITCH_CLASSES {
        let series: Vec<f32> = chroma.iter().map(|c| c[pc]).collect();
        for (column, value) in chroma.iter_mut().zip(median_filter(&series, window)) {
            column[pc] = value;
        }
    }
}

pub fn norm(v: &PitchClassVector) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale to unit L2 norm; near-silent vectors become all-zero.
pub fn normalize(v: &mut PitchClassVector) {
    let n = norm(v);
    if n < SILENCE_NORM {
        *v = [0.0; PITCH_CLASSES];
    } else {
        v.iter_mut().for_each(|x| *x /= n);
    }
}

pub fn dot(a: &PitchClassVector, b: &PitchClassVector) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Arithmetic mean of `frames` (all-zero for an empty slice).
pub fn mean(frames: &[PitchClassVector]) -> PitchClassVector {
    let mut acc = [0.0f32; PITCH_CLASSES];
    if frames.is_empty() {
        return acc;
    }
    for frame in frames {
        for (a, x) in acc.iter_mut().zip(frame.iter()) {
            *a += x;
        }
    }
    acc.iter_mut().for_each(|a| *a /= frames.len() as f32);
    acc
}
