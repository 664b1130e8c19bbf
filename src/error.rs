use thiserror::Error;

use crate::agents::RegistryError;
use crate::store::StoreError;
use crate::tmux::MuxError;

/// Failures surfaced by session core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("agent binary not found on PATH: {0}")]
    MissingBinary(String),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error("project is locked by running process {0}")]
    LockHeld(u32),

    #[error(transparent)]
    Store(StoreError),

    #[error("session is not running: {0}")]
    NotRunning(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("no such instance: {0}")]
    UnknownInstance(String),

    #[error("no such group: {0}")]
    UnknownGroup(String),
}

impl CoreError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockHeld(pid) => Self::LockHeld(pid),
            other => Self::Store(other),
        }
    }
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        Self::InvariantViolation(err.to_string())
    }
}
