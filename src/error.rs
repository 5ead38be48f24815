use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The audio could not be loaded at all. Fatal for a request.
    #[error("could not load audio {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single call into the external detector suite failed.
    #[error("detector '{detector}' failed: {message}")]
    Detector { detector: String, message: String },

    /// A strategy cannot run on this host at all.
    #[error("{0} is unavailable")]
    Unavailable(String),

    #[error("stem separation failed: {0}")]
    Separation(String),

    #[error("malformed stream message: {0}")]
    Protocol(String),
}

impl AnalysisError {
    pub fn load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        AnalysisError::Load {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for the error class that must terminate a request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AnalysisError::Load { .. })
    }
}
