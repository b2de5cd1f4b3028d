use std::path::PathBuf;

use mapstack_core::SourceError;
use mapstack_supervisor::SupervisorError;
use thiserror::Error;

pub type PrepareResult<T> = Result<T, PrepareError>;

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("data directory {} is empty after preparation", .0.display())]
    DataDirEmpty(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl PrepareError {
    pub(crate) fn download(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Download {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
