//! Local PEM key files.
//!
//! Each kid maps to one PEM file (PKCS#8 or PKCS#1). Creation and expiry come
//! from an optional `<file>.meta.json` sidecar; without one, the file's
//! modification time is taken as the creation time.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;

use crate::error::{KeyError, Result};
use crate::keypair::parse_private_key_pem;
use crate::traits::{KeyManager, KeyMetadata};

/// Suffix appended to a key file's name to find its metadata sidecar.
pub const METADATA_SIDECAR_SUFFIX: &str = ".meta.json";

/// Key backend over static PEM files on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileKeyManager {
    paths: BTreeMap<String, PathBuf>,
}

impl FileKeyManager {
    /// Serve the single key at `path` under `kid`.
    pub fn new(kid: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            paths: BTreeMap::new(),
        }
        .with_key(kid, path)
    }

    /// Serve an additional key file.
    pub fn with_key(mut self, kid: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(kid.into(), path.into());
        self
    }

    /// The path configured for `kid`.
    pub fn path(&self, kid: &str) -> Option<&Path> {
        self.paths.get(kid).map(PathBuf::as_path)
    }

    fn resolve(&self, kid: &str) -> Result<&Path> {
        self.path(kid)
            .ok_or_else(|| KeyError::NotFound(kid.to_string()))
    }

    async fn read_private(&self, kid: &str) -> Result<RsaPrivateKey> {
        let path = self.resolve(kid)?;
        let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                KeyError::KeyUnavailable(format!("{kid}: no key file at {}", path.display()))
            } else {
                KeyError::Io(e)
            }
        })?;
        parse_private_key_pem(kid, &pem)
    }
}

/// `<path>.meta.json`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(METADATA_SIDECAR_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl KeyManager for FileKeyManager {
    async fn get_private_key(&self, kid: &str) -> Result<RsaPrivateKey> {
        self.read_private(kid).await
    }

    async fn get_public_key(&self, kid: &str) -> Result<RsaPublicKey> {
        Ok(self.read_private(kid).await?.to_public_key())
    }

    async fn list_kids(&self) -> Result<Vec<String>> {
        Ok(self.paths.keys().cloned().collect())
    }

    async fn is_available(&self) -> bool {
        for path in self.paths.values() {
            if tokio::fs::metadata(path).await.is_err() {
                return false;
            }
        }
        !self.paths.is_empty()
    }

    async fn key_metadata(&self, kid: &str) -> Result<KeyMetadata> {
        let path = self.resolve(kid)?;
        let sidecar = sidecar_path(path);

        match tokio::fs::read(&sidecar).await {
            Ok(bytes) => {
                let meta: KeyMetadata = serde_json::from_slice(&bytes).map_err(|e| {
                    KeyError::Configuration(format!(
                        "invalid key metadata {}: {e}",
                        sidecar.display()
                    ))
                })?;
                if meta.created_at.is_some() {
                    return Ok(meta);
                }
                // Sidecar without a creation time: fill it from the key file.
                let created_at = modified_at(path).await?;
                Ok(KeyMetadata {
                    created_at: Some(created_at),
                    ..meta
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(kid, path = %path.display(), "no key metadata sidecar, using mtime");
                Ok(KeyMetadata {
                    created_at: Some(modified_at(path).await?),
                    expires_at: None,
                })
            }
            Err(e) => Err(KeyError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

async fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let meta = tokio::fs::metadata(path).await?;
    Ok(DateTime::<Utc>::from(meta.modified()?))
}
