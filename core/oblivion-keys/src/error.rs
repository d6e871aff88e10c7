//! Error types for the key lifecycle engine.

use thiserror::Error;

/// Key-system-specific errors.
#[derive(Debug, Error)]
pub enum KeyError {
    /// A required request parameter is missing or empty.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// The session has not completed the external link-verification flow.
    #[error("key system verification not completed")]
    VerificationRequired,

    /// Storage I/O error while persisting the database.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KeyError {
    /// Returns true if the error is recoverable by the client
    /// (bad input or an incomplete verification, not a server fault).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingParameter(_) | Self::VerificationRequired)
    }
}

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;
