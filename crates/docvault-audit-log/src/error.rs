//! Error types for the event log and chain seals.

use docvault_audit_signing::SigningError;
use thiserror::Error;

/// Errors that can occur while writing, sealing or verifying partitions.
#[derive(Debug, Error)]
pub enum LogError {
    /// Unusable directory layout or logger settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing partition or seal.
    #[error("not found: {0}")]
    NotFound(String),

    /// Partition has no lines to seal.
    #[error("partition {0} is empty")]
    Empty(String),

    /// The recomputed chain hash differs from the sealed one.
    #[error("integrity mismatch for {date}: sealed {expected}, computed {actual}")]
    IntegrityMismatch {
        date: String,
        expected: String,
        actual: String,
    },

    /// The seal's signature does not verify or does not match its record.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The key that signed the seal is outside the trust set.
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// Signing failure other than the above.
    #[error("signing error: {0}")]
    Signing(SigningError),

    /// A batch failed after reaching the partition and could not be cut
    /// back out, so some of its lines may be on disk. It is not re-queued.
    #[error("write of {lines} events to {date} is indeterminate: {source}")]
    IndeterminateWrite {
        date: String,
        lines: usize,
        source: std::io::Error,
    },

    /// The logger was closed.
    #[error("logger is closed")]
    Closed,

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Seal record encoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SigningError> for LogError {
    fn from(e: SigningError) -> Self {
        match e {
            SigningError::InvalidSignature(msg) | SigningError::MalformedToken(msg) => {
                LogError::InvalidSignature(msg)
            }
            SigningError::KeyUnavailable(msg) => LogError::KeyUnavailable(msg),
            other => LogError::Signing(other),
        }
    }
}

impl From<tokio::task::JoinError> for LogError {
    fn from(e: tokio::task::JoinError) -> Self {
        LogError::Io(std::io::Error::other(e))
    }
}

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;
