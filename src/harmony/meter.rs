//! Beats per bar from the periodicity of the onset envelope.

use crate::audio::decode::AudioData;
use crate::audio::onset::{autocorrelation_at, onset_strength};

pub const TRIPLE: u8 = 3;
pub const COMMON: u8 = 4;

/// Triple meter must beat common time by this ratio.
const TRIPLE_MARGIN: f32 = 1.1;

/// 3 or 4 beats per bar, from the waveform and a previously estimated tempo.
pub fn estimate_meter(audio: &AudioData, tempo: f32, hop_length: usize) -> u8 {
    if !(tempo > 0.0) || hop_length == 0 {
        return COMMON;
    }
    let envelope = onset_strength(audio, hop_length);
    meter_from_envelope(&envelope, audio.sample_rate as f32 / hop_length as f32, tempo)
}

/// Compare envelope self-similarity at 3-beat and 4-beat lags.
pub fn meter_from_envelope(envelope: &[f32], frame_rate: f32, tempo: f32) -> u8 {
    if !(tempo > 0.0) || !(frame_rate > 0.0) || envelope.is_empty() {
        return COMMON;
    }
    let beat_gap = 60.0 / tempo * frame_rate;
    let lag3 = (beat_gap * 3.0) as usize;
    let lag4 = (beat_gap * 4.0) as usize;
    if lag3 == 0 {
        return COMMON;
    }

    let score3 = autocorrelation_at(envelope, lag3);
    let score4 = autocorrelation_at(envelope, lag4);
    log::debug!("Meter: ac[3 beats]={:.3}, ac[4 beats]={:.3}", score3, score4);

    if score3 > score4 * TRIPLE_MARGIN {
        TRIPLE
    } else {
        COMMON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accent every `bar` beats, weak pulses on the other beats.
    fn accented(len: usize, beat: usize, bar: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                if i % (beat * bar) == 0 {
                    1.0
                } else if i % beat == 0 {
                    0.2
                } else {
                    0.0
                }
            })
            .collect()
    }

    #[test]
    fn waltz_accents_are_triple() {
        // 10 frames per beat at 10 frames/s -> 60 bpm
        let env = accented(600, 10, 3);
        assert_eq!(meter_from_envelope(&env, 10.0, 60.0), TRIPLE);
    }

    #[test]
    fn four_beat_accents_are_common() {
        let env = accented(600, 10, 4);
        assert_eq!(meter_from_envelope(&env, 10.0, 60.0), COMMON);
    }

    #[test]
    fn degenerate_inputs_default_to_common() {
        assert_eq!(meter_from_envelope(&[], 10.0, 60.0), COMMON);
        assert_eq!(meter_from_envelope(&[1.0; 10], 10.0, 0.0), COMMON);
        assert_eq!(meter_from_envelope(&[1.0; 10], 10.0, f32::NAN), COMMON);
        // lags beyond the envelope
        assert_eq!(meter_from_envelope(&[1.0; 10], 10.0, 60.0), COMMON);
        assert_eq!(meter_from_envelope(&[0.0; 600], 10.0, 120.0), COMMON);
        assert_eq!(meter_from_envelope(&[1.0; 600], 0.0, 120.0), COMMON);
        let silence = AudioData::new(vec![0.0; 2048], 22050);
        assert_eq!(estimate_meter(&silence, 120.0, 512), COMMON);
        assert_eq!(estimate_meter(&silence, -1.0, 512), COMMON);
        assert_eq!(estimate_meter(&silence, 120.0, 0), COMMON);
    }
}
