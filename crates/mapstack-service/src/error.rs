use mapstack_control::ControlError;
use mapstack_prepare::PrepareError;
use mapstack_state::StateError;
use mapstack_supervisor::SupervisorError;
use thiserror::Error;

pub type MachineResult<T> = Result<T, MachineError>;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Prepare(#[from] PrepareError),

    #[error("deployment marker: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("control plane: {0}")]
    Control(#[from] ControlError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MachineError {
    /// Errors that must end the process even in managed mode.
    ///
    /// An empty data directory after a "successful" preparation means the
    /// on-disk state cannot be trusted; everything else fails one switch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Prepare(PrepareError::DataDirEmpty(_)))
    }
}
