//! Core error types for icasync.

use thiserror::Error;

/// Core error type for icasync operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record was constructed with missing or invalid required fields.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A sync payload requested a conflict-resolution policy that has no
    /// defined behavior.
    #[error("Unsupported conflict resolution: {0}")]
    UnsupportedConflictResolution(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}
