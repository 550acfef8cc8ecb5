//! Service configuration, from serde or the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use docvault_audit_keys::{
    FileKeyManager, KeyManager, LifecycleConfig, VaultConfig, VaultKeyManager,
    DEFAULT_GRACE_DAYS, DEFAULT_ROTATION_DAYS,
};
use docvault_audit_log::{LoggerConfig, DEFAULT_MAX_BUFFER};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

/// Default retention window for partitions and seals.
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

/// Default period of the scheduler's wake-up tick.
pub const DEFAULT_TICK_SECS: u64 = 3600;

const MAX_KEY_PERIOD_DAYS: i64 = 36_500;

/// Top-level configuration for [`AuditService`](crate::AuditService).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Root directory; logs go to `<root>/logs`, seals to `<root>/signatures`.
    pub root_dir: PathBuf,
    pub logger: LoggerSettings,
    /// Partitions and seals older than this many days are deleted.
    pub retention_days: u32,
    pub keys: KeySettings,
    pub scheduler: SchedulerSettings,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./audit"),
            logger: LoggerSettings::default(),
            retention_days: DEFAULT_RETENTION_DAYS,
            keys: KeySettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    pub max_buffer: usize,
    pub flush_interval_secs: u64,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            max_buffer: DEFAULT_MAX_BUFFER,
            flush_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    /// Kid to sign with at startup.
    pub current_kid: String,
    pub rotation_days: i64,
    pub grace_days: i64,
    pub backend: KeyBackendConfig,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            current_kid: String::new(),
            rotation_days: DEFAULT_ROTATION_DAYS,
            grace_days: DEFAULT_GRACE_DAYS,
            backend: KeyBackendConfig::default(),
        }
    }
}

/// Where signing keys come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyBackendConfig {
    /// One PEM file holding the current kid's private key.
    File { key_path: PathBuf },
    /// KV v2 secret store.
    Vault(VaultConfig),
}

impl Default for KeyBackendConfig {
    fn default() -> Self {
        KeyBackendConfig::File {
            key_path: PathBuf::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Run the daily cycle in the background.
    pub enabled: bool,
    pub tick_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: DEFAULT_TICK_SECS,
        }
    }
}

impl AuditConfig {
    /// Read the configuration from `AUDIT_*` and `VAULT_*` variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AuditConfig::default();

        if let Some(root) = lookup("AUDIT_ROOT_DIR") {
            config.root_dir = PathBuf::from(root);
        }
        set_parsed(&lookup, "AUDIT_MAX_BUFFER", &mut config.logger.max_buffer)?;
        set_parsed(
            &lookup,
            "AUDIT_FLUSH_INTERVAL_SECS",
            &mut config.logger.flush_interval_secs,
        )?;
        set_parsed(&lookup, "AUDIT_RETENTION_DAYS", &mut config.retention_days)?;
        set_parsed(&lookup, "AUDIT_KEY_ROTATION_DAYS", &mut config.keys.rotation_days)?;
        set_parsed(&lookup, "AUDIT_KEY_GRACE_DAYS", &mut config.keys.grace_days)?;
        set_parsed(&lookup, "AUDIT_SCHEDULER_ENABLED", &mut config.scheduler.enabled)?;
        set_parsed(
            &lookup,
            "AUDIT_SCHEDULER_TICK_SECS",
            &mut config.scheduler.tick_interval_secs,
        )?;
        if let Some(kid) = lookup("AUDIT_SIGNING_KID") {
            config.keys.current_kid = kid;
        }

        let backend = lookup("AUDIT_KEY_BACKEND").unwrap_or_else(|| "file".to_string());
        config.keys.backend = match backend.as_str() {
            "file" => KeyBackendConfig::File {
                key_path: lookup("AUDIT_SIGNING_KEY_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_default(),
            },
            "vault" => {
                let mut vault = VaultConfig::new(
                    lookup("VAULT_ADDR").unwrap_or_default(),
                    lookup("VAULT_TOKEN").unwrap_or_default(),
                );
                if let Some(mount) = lookup("AUDIT_VAULT_MOUNT") {
                    vault = vault.with_mount(mount);
                }
                if let Some(prefix) = lookup("AUDIT_VAULT_PREFIX") {
                    vault = vault.with_prefix(prefix);
                }
                if let Some(namespace) = lookup("VAULT_NAMESPACE").filter(|n| !n.is_empty()) {
                    vault = vault.with_namespace(namespace);
                }
                KeyBackendConfig::Vault(vault)
            }
            other => {
                return Err(AuditError::Configuration(format!(
                    "AUDIT_KEY_BACKEND must be \"file\" or \"vault\", got {other:?}"
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_settings()?;
        match &self.keys.backend {
            KeyBackendConfig::File { key_path } if key_path.as_os_str().is_empty() => {
                Err(AuditError::Configuration("signing key path is empty".into()))
            }
            KeyBackendConfig::File { .. } => Ok(()),
            KeyBackendConfig::Vault(vault) => Ok(vault.validate()?),
        }
    }

    /// Everything except the key backend, which callers may supply directly.
    pub(crate) fn validate_settings(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(AuditError::Configuration("root_dir is empty".into()));
        }
        if self.retention_days == 0 {
            return Err(AuditError::Configuration("retention_days must be positive".into()));
        }
        if self.scheduler.tick_interval_secs == 0 {
            return Err(AuditError::Configuration(
                "scheduler tick interval must be positive".into(),
            ));
        }
        for (name, days) in [
            ("rotation_days", self.keys.rotation_days),
            ("grace_days", self.keys.grace_days),
        ] {
            if !(-MAX_KEY_PERIOD_DAYS..=MAX_KEY_PERIOD_DAYS).contains(&days) {
                return Err(AuditError::Configuration(format!(
                    "{name} must be within {MAX_KEY_PERIOD_DAYS} days"
                )));
            }
        }
        self.logger_config().validate()?;
        self.lifecycle_config().validate()?;
        Ok(())
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            max_buffer: self.logger.max_buffer,
            flush_interval: Duration::from_secs(self.logger.flush_interval_secs),
        }
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig::new(self.keys.current_kid.clone())
            .with_rotation_period(chrono::Duration::days(self.keys.rotation_days))
            .with_grace_period(chrono::Duration::days(self.keys.grace_days))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_interval_secs)
    }

    /// Build the configured key backend.
    pub fn key_manager(&self) -> Result<Arc<dyn KeyManager>> {
        let backend: Arc<dyn KeyManager> = match &self.keys.backend {
            KeyBackendConfig::File { key_path } => Arc::new(FileKeyManager::new(
                self.keys.current_kid.clone(),
                key_path.clone(),
            )),
            KeyBackendConfig::Vault(vault) => Arc::new(VaultKeyManager::new(vault.clone())?),
        };
        Ok(backend)
    }
}

fn set_parsed<F, T>(lookup: &F, name: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| AuditError::Configuration(format!("{name}={raw:?}: {e}")))?;
    }
    Ok(())
}
