//! In-memory implementation of the KeyManager trait.
//!
//! This is primarily for testing. Keys are inserted directly instead of being
//! provisioned by an operator, and availability can be toggled to simulate an
//! outage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{KeyError, Result};
use crate::traits::{KeyManager, KeyMetadata};

struct StoredKey {
    private_key: RsaPrivateKey,
    metadata: KeyMetadata,
}

/// In-memory key backend. Thread-safe via RwLock.
pub struct MemoryKeyManager {
    keys: RwLock<BTreeMap<String, StoredKey>>,
    available: AtomicBool,
}

impl MemoryKeyManager {
    /// Create an empty, available backend.
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Store `key` under `kid` with no metadata, replacing any previous entry.
    pub fn insert(&self, kid: impl Into<String>, key: RsaPrivateKey) {
        self.insert_with_metadata(kid, key, KeyMetadata::default());
    }

    /// Store `key` under `kid` with backend-recorded metadata.
    pub fn insert_with_metadata(
        &self,
        kid: impl Into<String>,
        key: RsaPrivateKey,
        metadata: KeyMetadata,
    ) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(
            kid.into(),
            StoredKey {
                private_key: key,
                metadata,
            },
        );
    }

    /// Remove `kid`. Returns whether it was present.
    pub fn remove(&self, kid: &str) -> bool {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.remove(kid).is_some()
    }

    /// Simulate the backend going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KeyError::Backend("memory backend marked unavailable".into()))
        }
    }
}

impl Default for MemoryKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyManager for MemoryKeyManager {
    async fn get_private_key(&self, kid: &str) -> Result<RsaPrivateKey> {
        self.check_available()?;
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(kid)
            .map(|k| k.private_key.clone())
            .ok_or_else(|| KeyError::NotFound(kid.to_string()))
    }

    async fn get_public_key(&self, kid: &str) -> Result<RsaPublicKey> {
        self.check_available()?;
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(kid)
            .map(|k| k.private_key.to_public_key())
            .ok_or_else(|| KeyError::NotFound(kid.to_string()))
    }

    async fn list_kids(&self) -> Result<Vec<String>> {
        self.check_available()?;
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.keys().cloned().collect())
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn key_metadata(&self, kid: &str) -> Result<KeyMetadata> {
        self.check_available()?;
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(kid)
            .map(|k| k.metadata)
            .ok_or_else(|| KeyError::NotFound(kid.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::test_key;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_insert_and_load() {
        let km = MemoryKeyManager::new();
        km.insert("k1", test_key(0).clone());

        let private = km.get_private_key("k1").await.unwrap();
        assert_eq!(private, *test_key(0));
        let public = km.get_public_key("k1").await.unwrap();
        assert_eq!(public, test_key(0).to_public_key());
        assert_eq!(km.list_kids().await.unwrap(), vec!["k1".to_string()]);
        assert_eq!(km.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_unknown_kid() {
        let km = MemoryKeyManager::new();
        let err = km.get_private_key("missing").await.unwrap_err();
        assert!(matches!(err, KeyError::NotFound(ref kid) if kid == "missing"));
    }

    #[tokio::test]
    async fn test_metadata_and_remove() {
        let km = MemoryKeyManager::new();
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        km.insert_with_metadata(
            "k1",
            test_key(0).clone(),
            KeyMetadata {
                created_at: Some(created),
                expires_at: None,
            },
        );

        let meta = km.key_metadata("k1").await.unwrap();
        assert_eq!(meta.created_at, Some(created));
        assert!(meta.expires_at.is_none());

        assert!(km.remove("k1"));
        assert!(!km.remove("k1"));
        assert!(km.list_kids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let km = MemoryKeyManager::new();
        km.insert("k1", test_key(0).clone());
        km.set_available(false);

        assert!(!km.is_available().await);
        assert!(matches!(
            km.get_private_key("k1").await,
            Err(KeyError::Backend(_))
        ));

        km.set_available(true);
        assert!(km.get_private_key("k1").await.is_ok());
    }
}
