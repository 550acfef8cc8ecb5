//! Remote secret store backend speaking the HashiCorp Vault KV v2 HTTP API.
//!
//! Layout under the configured mount and prefix:
//!
//! - `GET  /v1/{mount}/data/{prefix}/{kid}` → `data.data.{private_key, public_key?, created_at?, expires_at?}`
//! - `GET  /v1/{mount}/metadata/{prefix}?list=true` → `data.keys`
//! - `GET  /v1/sys/health` for availability
//!
//! Requests carry `X-Vault-Token` and, when configured, `X-Vault-Namespace`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{KeyError, Result};
use crate::keypair::{parse_private_key_pem, parse_public_key_pem};
use crate::traits::{KeyManager, KeyMetadata};

/// Default KV v2 mount.
pub const DEFAULT_MOUNT: &str = "secret";

/// Default path prefix under the mount where signing keys live.
pub const DEFAULT_PREFIX: &str = "docvault/signing-keys";

/// Connection settings for [`VaultKeyManager`].
#[derive(Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Base address, e.g. `https://vault.internal:8200`.
    pub addr: String,
    pub token: String,
    #[serde(default = "default_mount")]
    pub mount: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_mount() -> String {
    DEFAULT_MOUNT.to_string()
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl VaultConfig {
    /// Config with the default mount, prefix and timeout.
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: token.into(),
            mount: default_mount(),
            prefix: default_prefix(),
            namespace: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Check that the address and token are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.addr.starts_with("http://") || self.addr.starts_with("https://")) {
            return Err(KeyError::Configuration(format!(
                "vault address must be an http(s) URL, got {:?}",
                self.addr
            )));
        }
        if self.token.is_empty() {
            return Err(KeyError::Configuration("vault token is empty".into()));
        }
        if self.mount.trim_matches('/').is_empty() {
            return Err(KeyError::Configuration("vault mount is empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(KeyError::Configuration("vault timeout must be positive".into()));
        }
        Ok(())
    }

    fn base(&self) -> &str {
        self.addr.trim_end_matches('/')
    }

    fn mount(&self) -> &str {
        self.mount.trim_matches('/')
    }

    fn prefix(&self) -> &str {
        self.prefix.trim_matches('/')
    }

    fn data_url(&self, kid: &str) -> String {
        if self.prefix().is_empty() {
            format!("{}/v1/{}/data/{}", self.base(), self.mount(), kid)
        } else {
            format!("{}/v1/{}/data/{}/{}", self.base(), self.mount(), self.prefix(), kid)
        }
    }

    fn list_url(&self) -> String {
        if self.prefix().is_empty() {
            format!("{}/v1/{}/metadata", self.base(), self.mount())
        } else {
            format!("{}/v1/{}/metadata/{}", self.base(), self.mount(), self.prefix())
        }
    }

    fn health_url(&self) -> String {
        format!("{}/v1/sys/health", self.base())
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("addr", &self.addr)
            .field("token", &"<redacted>")
            .field("mount", &self.mount)
            .field("prefix", &self.prefix)
            .field("namespace", &self.namespace)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct KvReadResponse {
    data: KvReadData,
}

#[derive(Deserialize)]
struct KvReadData {
    data: StoredSecret,
}

#[derive(Deserialize)]
struct StoredSecret {
    private_key: String,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct KvListResponse {
    data: KvListData,
}

#[derive(Deserialize)]
struct KvListData {
    #[serde(default)]
    keys: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Multi-key backend over a Vault KV v2 mount.
pub struct VaultKeyManager {
    config: VaultConfig,
    client: reqwest::Client,
}

impl VaultKeyManager {
    /// Validate `config` and build the HTTP client.
    pub fn new(config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KeyError::Configuration(format!("vault http client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    fn request(&self, url: String) -> RequestBuilder {
        let req = self
            .client
            .get(url)
            .header("X-Vault-Token", &self.config.token);
        match &self.config.namespace {
            Some(ns) => req.header("X-Vault-Namespace", ns),
            None => req,
        }
    }

    async fn read_secret(&self, kid: &str) -> Result<StoredSecret> {
        if kid.is_empty() || kid.contains('/') {
            return Err(KeyError::NotFound(kid.to_string()));
        }

        let resp = self.request(self.config.data_url(kid)).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(KeyError::NotFound(kid.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(KeyError::Backend(format!(
                "reading {kid} returned {status}: {body}"
            )));
        }

        let parsed: KvReadResponse = resp
            .json()
            .await
            .map_err(|e| KeyError::Backend(format!("malformed secret for {kid}: {e}")))?;
        Ok(parsed.data.data)
    }
}

impl fmt::Debug for VaultKeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultKeyManager")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl KeyManager for VaultKeyManager {
    async fn get_private_key(&self, kid: &str) -> Result<RsaPrivateKey> {
        let secret = self.read_secret(kid).await?;
        parse_private_key_pem(kid, &secret.private_key)
    }

    async fn get_public_key(&self, kid: &str) -> Result<RsaPublicKey> {
        let secret = self.read_secret(kid).await?;
        match secret.public_key {
            Some(pem) => parse_public_key_pem(kid, &pem),
            None => Ok(parse_private_key_pem(kid, &secret.private_key)?.to_public_key()),
        }
    }

    async fn list_kids(&self) -> Result<Vec<String>> {
        let url = format!("{}?list=true", self.config.list_url());
        let resp = self.request(url).send().await?;

        let status = resp.status();
        // Vault answers 404 for a prefix with no entries.
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(KeyError::Backend(format!("listing keys returned {status}: {body}")));
        }

        let parsed: KvListResponse = resp
            .json()
            .await
            .map_err(|e| KeyError::Backend(format!("malformed key list: {e}")))?;

        // Entries ending in '/' are sub-folders, not keys.
        let mut kids: Vec<String> = parsed
            .data
            .keys
            .into_iter()
            .filter(|k| !k.ends_with('/'))
            .collect();
        kids.sort();
        debug!(count = kids.len(), "listed vault signing keys");
        Ok(kids)
    }

    async fn is_available(&self) -> bool {
        match self.request(self.config.health_url()).send().await {
            // 429 is a healthy standby node.
            Ok(resp) => {
                resp.status().is_success() || resp.status() == StatusCode::TOO_MANY_REQUESTS
            }
            Err(e) => {
                warn!(error = %e, "vault health check failed");
                false
            }
        }
    }

    async fn key_metadata(&self, kid: &str) -> Result<KeyMetadata> {
        let secret = self.read_secret(kid).await?;
        Ok(KeyMetadata {
            created_at: secret.created_at,
            expires_at: secret.expires_at,
        })
    }

    fn backend_name(&self) -> &'static str {
        "vault"
    }
}
