use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub fast: FastConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub separation: SeparationConfig,
}

/// Parameters of the precise signal-processing path.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Longer inputs are truncated before analysis.
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f32,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_median_window")]
    pub median_window: usize,
    #[serde(default = "default_precise_min_duration")]
    pub precise_min_duration: f32,
    #[serde(default = "default_simple_min_duration")]
    pub simple_min_duration: f32,
    #[serde(default = "default_fallback_step")]
    pub fallback_step_secs: f32,
    #[serde(default = "default_beats_per_bar")]
    pub beats_per_bar: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FastConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_chord_program")]
    pub chord_program: String,
    #[serde(default = "default_key_program")]
    pub key_program: String,
    #[serde(default = "default_tempo_program")]
    pub tempo_program: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_analyses: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: f32,
    #[serde(default = "default_min_secs")]
    pub min_secs: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeparationConfig {
    #[serde(default = "default_separation_program")]
    pub program: String,
    #[serde(default = "default_separation_model")]
    pub model: String,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            max_duration_secs: default_max_duration(),
            hop_length: default_hop_length(),
            fft_size: default_fft_size(),
            median_window: default_median_window(),
            precise_min_duration: default_precise_min_duration(),
            simple_min_duration: default_simple_min_duration(),
            fallback_step_secs: default_fallback_step(),
            beats_per_bar: default_beats_per_bar(),
        }
    }
}

impl Default for FastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: default_cache_dir(),
            chord_program: default_chord_program(),
            key_program: default_key_program(),
            tempo_program: default_tempo_program(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyses: default_max_concurrent(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            window_secs: default_window_secs(),
            min_secs: default_min_secs(),
        }
    }
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            program: default_separation_program(),
            model: default_separation_model(),
            work_dir: None,
        }
    }
}

fn default_sample_rate() -> u32 { 22050 }
fn default_max_duration() -> f32 { 300.0 }
fn default_hop_length() -> usize { 512 }
fn default_fft_size() -> usize { 4096 }
fn default_median_window() -> usize { 3 }
fn default_precise_min_duration() -> f32 { 0.2 }
fn default_simple_min_duration() -> f32 { 0.8 }
fn default_fallback_step() -> f32 { 0.5 }
fn default_beats_per_bar() -> u32 { 4 }
fn default_true() -> bool { true }
fn default_chord_program() -> String { "CNNChordRecognition".into() }
fn default_key_program() -> String { "KeyRecognition".into() }
fn default_tempo_program() -> String { "TempoDetector".into() }
fn default_max_concurrent() -> usize { 2 }
fn default_window_secs() -> f32 { 1.0 }
fn default_min_secs() -> f32 { 0.5 }
fn default_separation_program() -> String { "demucs".into() }
fn default_separation_model() -> String { "htdemucs".into() }

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("chordia"))
        .unwrap_or_else(|| PathBuf::from("cache"))
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// Explicit path first, then `./chordia.toml`, then the platform config dir.
pub fn discover_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("chordia.toml");
    if local.exists() {
        return Some(local);
    }
    let platform = dirs::config_dir()?.join("chordia").join("config.toml");
    platform.exists().then_some(platform)
}
