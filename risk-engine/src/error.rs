//! Error types for risk engine

use thiserror::Error;

/// Risk engine error
///
/// Rule violations are not errors; they surface as [`crate::Decision::Denied`].
#[derive(Debug, Error)]
pub enum Error {
    /// No profile exists for the user id
    #[error("user not found")]
    UserNotFound(String),

    /// Backing store failed transiently
    #[error("store unavailable")]
    StoreUnavailable(String),

    /// Request rejected before any rule ran
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Caller-supplied deadline elapsed before a decision was reached
    #[error("timeout")]
    Timeout,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Whether the orchestration layer should retry the failed store call
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
