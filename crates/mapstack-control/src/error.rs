//! Control plane error types.

use thiserror::Error;

/// Errors that can occur while talking to the control plane.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid control plane url: {0}")]
    InvalidUrl(String),

    #[error("control plane connection failed: {0}")]
    Connection(String),

    #[error("publish of {key} failed: {reason}")]
    Publish { key: String, reason: String },
}

pub type ControlResult<T> = Result<T, ControlError>;
