//! Error types for key backends and the key lifecycle.

use thiserror::Error;

/// Errors that can occur while loading or managing signing keys.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No usable key material (nothing loaded, or kid outside the trust set).
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// The backend has no key under this id.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The backend returned material that is not a usable RSA key.
    #[error("invalid key material for {kid}: {reason}")]
    InvalidKey { kid: String, reason: String },

    /// RSA modulus below the accepted minimum.
    #[error("key {kid} is {bits} bits, minimum is {min}")]
    KeyTooSmall { kid: String, bits: usize, min: usize },

    /// Remote secret store failure (transport, HTTP status, payload).
    #[error("key backend error: {0}")]
    Backend(String),

    /// Invalid backend or lifecycle configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Rotation request that cannot be applied.
    #[error("rotation rejected: {0}")]
    RotationRejected(String),

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeyError {
    /// Whether this error means "no usable key" from a caller's point of view.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            KeyError::KeyUnavailable(_)
                | KeyError::NotFound(_)
                | KeyError::InvalidKey { .. }
                | KeyError::KeyTooSmall { .. }
        )
    }
}

impl From<reqwest::Error> for KeyError {
    fn from(e: reqwest::Error) -> Self {
        KeyError::Backend(e.to_string())
    }
}

/// Result type for key operations.
pub type Result<T> = std::result::Result<T, KeyError>;
