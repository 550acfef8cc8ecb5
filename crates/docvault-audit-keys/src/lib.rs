//! # docvault audit keys
//!
//! Signing key backends and the key lifecycle for the docvault audit
//! subsystem.
//!
//! ## Overview
//!
//! Key material sits behind the [`KeyManager`] trait so the lifecycle is
//! backend-agnostic. [`FileKeyManager`] reads static PEM files,
//! [`VaultKeyManager`] reads a Vault KV v2 mount, and [`MemoryKeyManager`]
//! serves tests. [`KeyLifecycleManager`] sits on top and decides which key
//! signs and which keys verify.
//!
//! ## Key Types
//!
//! - [`KeyManager`] - The async trait for all key backends
//! - [`KeyLifecycleManager`] - Current/previous keys, rotation, trust set
//! - [`KeyPair`] - A loaded key with its validity window
//! - [`JwkSet`] - JWKS export of the trust set
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docvault_audit_core::SystemClock;
//! use docvault_audit_keys::{FileKeyManager, KeyLifecycleManager, LifecycleConfig};
//!
//! async fn example() {
//!     let backend = Arc::new(FileKeyManager::new("k1", "/etc/docvault/signing.pem"));
//!     let keys = KeyLifecycleManager::initialize(
//!         backend,
//!         LifecycleConfig::new("k1"),
//!         Arc::new(SystemClock),
//!     )
//!     .await
//!     .unwrap();
//!
//!     let jwks = keys.get_jwks();
//!     println!("{}", serde_json::to_string(&jwks).unwrap());
//! }
//! ```

pub mod error;
pub mod file;
pub mod jwks;
pub mod keypair;
pub mod lifecycle;
pub mod memory;
pub mod traits;
pub mod vault;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use error::{KeyError, Result};
pub use file::FileKeyManager;
pub use jwks::{Jwk, JwkSet, SIGNING_ALGORITHM};
pub use keypair::{parse_private_key_pem, parse_public_key_pem, KeyPair, MIN_RSA_BITS};
pub use lifecycle::{
    KeyLifecycleManager, KeyStatus, LifecycleConfig, LifecycleSnapshot, RotationSummary,
    SigningKey, DEFAULT_GRACE_DAYS, DEFAULT_ROTATION_DAYS,
};
pub use memory::MemoryKeyManager;
pub use traits::{KeyManager, KeyMetadata};
pub use vault::{VaultConfig, VaultKeyManager};
