use thiserror::Error;

use crate::model::Platform;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid platform '{got}' for {expected} live tracker")]
    WrongPlatform { expected: Platform, got: Platform },

    #[error("Already tracking '{0}'")]
    AlreadyTracked(String),

    #[error("Not tracking '{0}'")]
    NotTracked(String),

    #[error("Platform '{0}' is not supported")]
    UnsupportedPlatform(String),

    /// Poll or resolution call failed. Scheduled polls swallow it,
    /// explicit requests hand it back to the caller.
    #[error("Upstream request failed: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
