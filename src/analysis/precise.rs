use std::path::Path;

use crate::analysis::result::{AnalysisResult, ChordSegment};
use crate::audio::beats;
use crate::audio::chroma::{self, ChromaConfig};
use crate::audio::decode::{decode_audio, AudioData};
use crate::audio::onset::onset_strength;
use crate::audio::spectrum::frame_count;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::harmony::classify::{segment_chords, FrameClock};
use crate::harmony::key::estimate_key;
use crate::harmony::meter::estimate_meter;
use crate::harmony::simplify::simplify;
use crate::harmony::smooth::smooth;
use crate::harmony::templates::TemplateBank;

/// Full signal-processing analysis of an already decoded waveform.
pub fn analyze(audio: &AudioData, config: &AnalysisConfig) -> Result<AnalysisResult> {
    if audio.sample_rate == 0 || config.hop_length == 0 || config.fft_size == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "sample rate {} / hop {} / fft {}",
            audio.sample_rate, config.hop_length, config.fft_size
        )));
    }
    if audio.is_silent() {
        log::info!("Input is silent; returning default result");
        return Ok(AnalysisResult::default());
    }

    let duration = audio.duration();
    log::info!("Analyzing {:.1}s of audio at {} Hz", duration, audio.sample_rate);

    let chroma_config = ChromaConfig {
        fft_size: config.fft_size,
        hop_length: config.hop_length,
        median_window: config.median_window,
        separate_harmonic: true,
    };
    let features = chroma::extract(audio, &chroma_config);

    let envelope = onset_strength(audio, config.hop_length);
    let n_frames = frame_count(audio.samples.len(), config.hop_length);
    let grid = beats::boundaries(
        &envelope,
        n_frames,
        audio.sample_rate,
        config.hop_length,
        config.fallback_step_secs,
    );
    log::info!(
        "Tempo {:.1} bpm over {} boundaries{}",
        grid.tempo,
        grid.frames.len(),
        if grid.synthetic { " (uniform fallback)" } else { "" }
    );

    let key = estimate_key(&features);
    let meter = estimate_meter(audio, grid.tempo, config.hop_length);
    log::info!("Key {} {}, meter {}/4", key.name(), key.scale.as_str(), meter);

    let clock = FrameClock {
        sample_rate: audio.sample_rate,
        hop_length: config.hop_length,
        duration,
    };
    let raw = segment_chords(&features, &grid.frames, &clock, TemplateBank::global());

    let simplified: Vec<ChordSegment> = raw
        .iter()
        .map(|s| ChordSegment::new(s.start, s.end, simplify(&s.chord), s.confidence))
        .collect();

    let chords = smooth(&raw, config.precise_min_duration);
    let simple_chords = smooth(&simplified, config.simple_min_duration);
    log::info!(
        "{} chord segments ({} simplified)",
        chords.len(),
        simple_chords.len()
    );

    Ok(AnalysisResult {
        tempo: (grid.tempo * 100.0).round() / 100.0,
        meter,
        key: key.name().to_string(),
        scale: key.scale,
        chords,
        simple_chords,
        instrumental_path: None,
    })
}

/// Decode `path` with the configured limits, then [`analyze`] it.
pub fn analyze_file(path: &Path, config: &AnalysisConfig) -> Result<AnalysisResult> {
    let audio = decode_audio(path, config.max_duration_secs, config.sample_rate)?;
    analyze(&audio, config)
}
