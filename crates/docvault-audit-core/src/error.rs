//! Error types for the docvault audit core.

use thiserror::Error;

/// Core errors raised while building or parsing audit primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid chain hash: {0}")]
    InvalidHash(String),

    #[error("invalid evidence: {0}")]
    InvalidEvidence(String),

    #[error("invalid partition date: {0}")]
    InvalidDate(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
