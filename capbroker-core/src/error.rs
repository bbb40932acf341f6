//! Error types for capability broker operations

use crate::broker::ExecutionStatus;

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Error types for the capability broker
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// No registered tool owns the capability
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// A tool with this id is already registered
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    /// The pipeline finished without a successful result
    #[error("Capability execution ended with status {status}: {message}")]
    ExecutionFailed {
        /// Terminal status of the pipeline run
        status: ExecutionStatus,
        /// Error message carried by the result
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A shared table lock was poisoned by a panicking writer
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for BrokerError {
    fn from(s: String) -> Self {
        BrokerError::Other(s)
    }
}

impl From<&str> for BrokerError {
    fn from(s: &str) -> Self {
        BrokerError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for BrokerError {
    fn from(err: anyhow::Error) -> Self {
        BrokerError::Other(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for BrokerError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        BrokerError::LockPoisoned("broker state")
    }
}
