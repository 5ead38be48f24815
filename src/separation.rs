//! Vocal/instrument separation collaborator.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::SeparationConfig;
use crate::error::{AnalysisError, Result};

/// Stems that add up to the instrumental residual.
const INSTRUMENTAL_STEMS: [&str; 3] = ["drums", "bass", "other"];

#[derive(Clone, Debug, PartialEq)]
pub struct Stems {
    pub vocals: PathBuf,
    pub instrumental: PathBuf,
}

pub trait StemSeparator: Send + Sync {
    fn separate(&self, path: &Path) -> Result<Stems>;
}

/// Runs a demucs-style CLI (`<program> -n <model> -o <dir> <file>`) and sums
/// the non-vocal stems into one instrumental WAV.
pub struct CommandSeparator {
    program: String,
    model: String,
    work_dir: PathBuf,
}

impl CommandSeparator {
    pub fn from_config(config: &SeparationConfig) -> Self {
        Self {
            program: config.program.clone(),
            model: config.model.clone(),
            work_dir: config
                .work_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("chordia-stems")),
        }
    }

    fn stem_dir(&self, path: &Path) -> PathBuf {
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        self.work_dir.join(&self.model).join(stem)
    }
}

impl StemSeparator for CommandSeparator {
    fn separate(&self, path: &Path) -> Result<Stems> {
        std::fs::create_dir_all(&self.work_dir)?;
        log::info!("Separating stems of {} with {}", path.display(), self.program);

        let output = Command::new(&self.program)
            .arg("-n")
            .arg(&self.model)
            .arg("-o")
            .arg(&self.work_dir)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| AnalysisError::Separation(format!("failed to spawn {}: {}", self.program, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::Separation(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let dir = self.stem_dir(path);
        let inputs: Vec<PathBuf> = INSTRUMENTAL_STEMS
            .iter()
            .map(|name| dir.join(format!("{}.wav", name)))
            .collect();
        let instrumental = dir.join("instrumental.wav");
        mix_stems(&inputs, &instrumental)?;

        log::info!("Instrumental written to {}", instrumental.display());
        Ok(Stems {
            vocals: dir.join("vocals.wav"),
            instrumental,
        })
    }
}

fn read_wav(path: &Path) -> Result<(hound::WavSpec, Vec<f32>)> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| AnalysisError::Separation(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    let samples: std::result::Result<Vec<f32>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
    };
    let samples = samples.map_err(|e| AnalysisError::Separation(format!("{}: {}", path.display(), e)))?;
    Ok((spec, samples))
}

/// Sum equally-shaped WAV stems sample by sample into a float WAV at `output`.
pub fn mix_stems(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let mut mix: Vec<f32> = Vec::new();
    let mut layout: Option<(u16, u32)> = None;

    for input in inputs {
        let (spec, samples) = read_wav(input)?;
        match layout {
            None => layout = Some((spec.channels, spec.sample_rate)),
            Some(expected) if expected != (spec.channels, spec.sample_rate) => {
                return Err(AnalysisError::Separation(format!(
                    "{} has layout {:?}, expected {:?}",
                    input.display(),
                    (spec.channels, spec.sample_rate),
                    expected
                )));
            }
            Some(_) => {}
        }
        if mix.len() < samples.len() {
            mix.resize(samples.len(), 0.0);
        }
        for (acc, s) in mix.iter_mut().zip(samples) {
            *acc += s;
        }
    }

    let (channels, sample_rate) =
        layout.ok_or_else(|| AnalysisError::Separation("no stems to mix".into()))?;
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(output, spec)
        .map_err(|e| AnalysisError::Separation(format!("{}: {}", output.display(), e)))?;
    for sample in mix {
        writer
            .write_sample(sample.clamp(-1.0, 1.0))
            .map_err(|e| AnalysisError::Separation(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AnalysisError::Separation(e.to_string()))?;
    Ok(())
}
