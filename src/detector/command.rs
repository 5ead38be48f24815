use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use super::{map_chord_label, DetectorSuite, RawChord};
use crate::config::FastConfig;
use crate::error::{AnalysisError, Result};

/// Detector suite backed by external command-line programs
/// (`<program> single <file>`), e.g. the madmom processors.
pub struct CommandSuite {
    chord_program: String,
    key_program: String,
    tempo_program: String,
    available: OnceLock<bool>,
}

impl CommandSuite {
    pub fn new(chord_program: &str, key_program: &str, tempo_program: &str) -> Self {
        Self {
            chord_program: chord_program.to_string(),
            key_program: key_program.to_string(),
            tempo_program: tempo_program.to_string(),
            available: OnceLock::new(),
        }
    }

    pub fn from_config(config: &FastConfig) -> Self {
        Self::new(&config.chord_program, &config.key_program, &config.tempo_program)
    }

    fn run(&self, program: &str, path: &Path) -> Result<String> {
        let output = Command::new(program)
            .arg("single")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| AnalysisError::Detector {
                detector: program.to_string(),
                message: format!("failed to spawn: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::Detector {
                detector: program.to_string(),
                message: format!("exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DetectorSuite for CommandSuite {
    fn name(&self) -> &str {
        "command"
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let missing: Vec<&str> = [&self.chord_program, &self.key_program, &self.tempo_program]
                .into_iter()
                .filter(|p| resolve_program(p).is_none())
                .map(String::as_str)
                .collect();
            if missing.is_empty() {
                log::info!("Fast detector suite available");
                true
            } else {
                log::info!("Fast detector suite unavailable; missing {:?}", missing);
                false
            }
        })
    }

    fn detect_chords(&self, path: &Path) -> Result<Vec<RawChord>> {
        log::info!("Detecting chords for {}", path.display());
        let stdout = self.run(&self.chord_program, path)?;
        let chords = parse_chord_lines(&stdout).map_err(|message| AnalysisError::Detector {
            detector: self.chord_program.clone(),
            message,
        })?;
        log::info!("Found {} chord segments", chords.len());
        Ok(chords)
    }

    fn detect_key(&self, path: &Path) -> Result<String> {
        log::info!("Detecting key for {}", path.display());
        let stdout = self.run(&self.key_program, path)?;
        stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::Detector {
                detector: self.key_program.clone(),
                message: "empty output".into(),
            })
    }

    fn detect_tempo(&self, path: &Path) -> Result<f32> {
        log::info!("Detecting tempo for {}", path.display());
        let stdout = self.run(&self.tempo_program, path)?;
        parse_tempo(&stdout).ok_or_else(|| AnalysisError::Detector {
            detector: self.tempo_program.clone(),
            message: format!("no tempo in output {:?}", stdout.trim()),
        })
    }
}

/// Lines of `start end label`, whitespace separated.
pub fn parse_chord_lines(output: &str) -> std::result::Result<Vec<RawChord>, String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let mut fields = line.split_whitespace();
            let start = fields.next().and_then(|f| f.parse::<f32>().ok());
            let end = fields.next().and_then(|f| f.parse::<f32>().ok());
            let label = fields.next();
            match (start, end, label) {
                (Some(start), Some(end), Some(label)) => Ok((start, end, map_chord_label(label))),
                _ => Err(format!("malformed chord line {:?}", line)),
            }
        })
        .collect()
}

/// First number on the first non-empty line.
pub fn parse_tempo(output: &str) -> Option<f32> {
    output
        .lines()
        .find(|l| !l.trim().is_empty())?
        .split_whitespace()
        .next()?
        .parse::<f32>()
        .ok()
}

/// Locate `program` as a path or on `PATH`.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chord_output() {
        let out = "0.000\t1.600\tN\n1.600\t3.200\tA:min\n\n3.200 4.000 Bb:maj\n";
        let chords = parse_chord_lines(out).unwrap();
        assert_eq!(
            chords,
            vec![
                (0.0, 1.6, "N.C.".to_string()),
                (1.6, 3.2, "Amin".to_string()),
                (3.2, 4.0, "A#".to_string()),
            ]
        );
        assert!(parse_chord_lines("0.0 oops").is_err());
        assert!(parse_chord_lines("").unwrap().is_empty());
    }

    #[test]
    fn parses_tempo_output() {
        assert_eq!(parse_tempo("\n121.30\t60.65\t0.71\n"), Some(121.3));
        assert_eq!(parse_tempo("none"), None);
        assert_eq!(parse_tempo(""), None);
    }

    #[test]
    fn missing_programs_make_suite_unavailable() {
        let suite = CommandSuite::new(
            "chordia-test-no-such-chords",
            "chordia-test-no-such-key",
            "chordia-test-no-such-tempo",
        );
        assert!(!suite.is_available());
        assert!(suite.detect_tempo(Path::new("x.wav")).is_err());
    }

    #[test]
    fn explicit_paths_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("detector");
        std::fs::write(&program, "#!/bin/sh\n").unwrap();
        assert_eq!(resolve_program(program.to_str().unwrap()), Some(program.clone()));
        assert!(resolve_program(dir.path().join("missing").to_str().unwrap()).is_none());
    }
}
