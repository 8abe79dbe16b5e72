use std::path::PathBuf;

/// Errors raised by the fallible surfaces around the detector: loading
/// configuration and parsing recorded transcripts. Detection itself never
/// fails.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config {path:?}: {reason}")]
    InvalidConfig { path: Option<PathBuf>, reason: String },

    #[error("Transcript line {line}: {reason}")]
    Transcript { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
