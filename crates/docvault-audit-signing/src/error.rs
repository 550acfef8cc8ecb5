//! Error types for evidence signing.

use docvault_audit_core::CoreError;
use docvault_audit_keys::KeyError;
use thiserror::Error;

/// Errors that can occur while signing or verifying evidence.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Bad signature, or an algorithm other than RS256.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Not a three-part compact JWS, or claims missing/unparseable.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// No signing key loaded, or the token's kid is outside the trust set.
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// Evidence rejected before signing.
    #[error("invalid evidence: {0}")]
    InvalidEvidence(String),

    /// Token construction failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Key backend failure that is not a missing key.
    #[error("key error: {0}")]
    Key(KeyError),
}

impl From<KeyError> for SigningError {
    fn from(e: KeyError) -> Self {
        if e.is_unavailable() {
            SigningError::KeyUnavailable(e.to_string())
        } else {
            SigningError::Key(e)
        }
    }
}

impl From<CoreError> for SigningError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidEvidence(msg) => SigningError::InvalidEvidence(msg),
            other => SigningError::InvalidEvidence(other.to_string()),
        }
    }
}

/// Result type for signing operations.
pub type Result<T> = std::result::Result<T, SigningError>;
