//! KeyManager trait: the capability interface over key-material backends.
//!
//! The lifecycle manager is backend-agnostic. Implementations include a
//! static local key file, a multi-key remote secret store, and an in-memory
//! map for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Creation and expiry times as recorded by the backend.
///
/// Either field may be unknown; the lifecycle manager only approximates
/// what the backend cannot tell it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Async interface to a source of RSA signing keys.
///
/// Private keys returned here never leave the key crate: the lifecycle
/// manager converts them into opaque signing handles immediately.
///
/// # Design Notes
///
/// - **Read-only**: backends never generate or delete keys. Provisioning is
///   an operator task.
/// - **Unknown kid**: `get_private_key`/`get_public_key` return
///   `KeyError::NotFound`.
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Load the private key stored under `kid`.
    async fn get_private_key(&self, kid: &str) -> Result<RsaPrivateKey>;

    /// Load the public key stored under `kid`.
    async fn get_public_key(&self, kid: &str) -> Result<RsaPublicKey>;

    /// All key ids known to the backend.
    async fn list_kids(&self) -> Result<Vec<String>>;

    /// Whether the backend can currently serve keys.
    async fn is_available(&self) -> bool;

    /// Creation/expiry metadata for `kid`, if the backend records any.
    async fn key_metadata(&self, _kid: &str) -> Result<KeyMetadata> {
        Ok(KeyMetadata::default())
    }

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
