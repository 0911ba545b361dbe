// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by an [`crate::Analyzer`] implementation.
///
/// Construction failures and export failures carry the offending path so
/// the server can surface a useful message in the job record.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Model file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading model file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a STEP physical file: {path}")]
    InvalidFormat { path: PathBuf },

    #[error("Model file contains no product entities: {path}")]
    EmptyModel { path: PathBuf },

    #[error("Failed to write {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl AnalyzerError {
    /// Classify an IO error from opening the model file.
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn export(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Export {
            path: path.into(),
            source,
        }
    }
}
