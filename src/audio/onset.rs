use super::decode::AudioData;
use super::spectrum::Spectrogram;

const ONSET_FFT_SIZE: usize = 2048;
const TOP_DB: f32 = 80.0;

/// Onset strength envelope: mean positive change of the log-magnitude
/// spectrum between consecutive frames, one value per hop.
pub fn onset_strength(audio: &AudioData, hop_length: usize) -> Vec<f32> {
    if audio.samples.is_empty() {
        return Vec::new();
    }
    let spec = Spectrogram::compute(
        &audio.samples,
        audio.sample_rate,
        ONSET_FFT_SIZE,
        hop_length,
        usize::MAX,
    );

    let peak = spec
        .frames
        .iter()
        .flatten()
        .copied()
        .fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return vec![0.0; spec.len()];
    }

    let floor_db = -TOP_DB;
    let to_db = |mag: f32| (20.0 * (mag / peak).max(1e-10).log10()).max(floor_db);

    let mut envelope = vec![0.0f32; spec.len()];
    let mut prev: Vec<f32> = spec.frames[0].iter().map(|&m| to_db(m)).collect();
    for (t, frame) in spec.frames.iter().enumerate().skip(1) {
        let cur: Vec<f32> = frame.iter().map(|&m| to_db(m)).collect();
        let flux: f32 = cur
            .iter()
            .zip(prev.iter())
            .map(|(c, p)| (c - p).max(0.0))
            .sum();
        envelope[t] = flux / cur.len().max(1) as f32;
        prev = cur;
    }
    envelope
}

/// Autocorrelation of `signal` at a single lag (0 when the lag does not fit).
pub fn autocorrelation_at(signal: &[f32], lag: usize) -> f32 {
    if lag >= signal.len() {
        return 0.0;
    }
    signal[..signal.len() - lag]
        .iter()
        .zip(signal[lag..].iter())
        .map(|(a, b)| a * b)
        .sum()
}
