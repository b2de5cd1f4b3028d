//! Supervisor error types.

use thiserror::Error;

/// Errors that can occur while supervising processes.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("process already running: {0}")]
    AlreadyRunning(String),

    #[error("failed to spawn {id} ({program}): {source}")]
    Spawn {
        id: String,
        program: String,
        source: std::io::Error,
    },
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
