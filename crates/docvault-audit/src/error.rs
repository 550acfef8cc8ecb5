//! Error types for the audit service.

use docvault_audit_core::CoreError;
use docvault_audit_keys::KeyError;
use docvault_audit_log::LogError;
use docvault_audit_signing::SigningError;
use thiserror::Error;

/// Errors that can occur in audit service operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Data model error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Key backend or lifecycle error.
    #[error("key error: {0}")]
    Keys(#[from] KeyError),

    /// Evidence signing or verification error.
    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    /// Event log or seal error.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// Invalid service configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AuditError {
    /// True when the failure is missing or untrusted key material.
    pub fn is_key_unavailable(&self) -> bool {
        match self {
            AuditError::Keys(e) => e.is_unavailable(),
            AuditError::Signing(SigningError::KeyUnavailable(_)) => true,
            AuditError::Log(LogError::KeyUnavailable(_)) => true,
            _ => false,
        }
    }
}

/// Result type for audit service operations.
pub type Result<T> = std::result::Result<T, AuditError>;
