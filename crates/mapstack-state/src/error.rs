//! Error types for the mapstack on-disk state.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or writing on-disk state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("read error at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("write error at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("walk error: {0}")]
    Walk(String),
}
