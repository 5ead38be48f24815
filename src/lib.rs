//! Chord, key, tempo and meter extraction from recorded or live audio.

pub mod analysis;
pub mod audio;
pub mod cache;
pub mod config;
pub mod detector;
pub mod error;
pub mod harmony;
pub mod separation;
pub mod stream;

use std::path::Path;

pub use analysis::engine::{Engine, Request};
pub use analysis::result::{AnalysisResult, ChordSegment, Scale};
pub use audio::decode::AudioData;
pub use config::Config;
pub use error::{AnalysisError, Result};

/// Precise signal-processing analysis of a decoded waveform.
pub fn analyze(audio: &AudioData, config: &config::AnalysisConfig) -> Result<AnalysisResult> {
    analysis::precise::analyze(audio, config)
}

/// Cached detector analysis of an audio file.
///
/// Returns [`AnalysisError::Unavailable`] when the detector suite is not
/// installed; callers then fall back to [`analyze`].
pub fn analyze_fast(path: &Path, config: &config::FastConfig) -> Result<AnalysisResult> {
    let analyzer = analysis::fast::FastAnalyzer::new(
        detector::CommandSuite::from_config(config),
        cache::DetectionCache::new(&config.cache_dir),
    );
    if !analyzer.is_available() {
        return Err(AnalysisError::Unavailable("fast detector suite".into()));
    }
    analyzer.analyze(path)
}
