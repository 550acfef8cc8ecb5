//! Key lifecycle: current/previous signing keys, rotation and the trust set.
//!
//! The manager keeps at most two keys cached: the current signer and, after a
//! rotation, the previous signer. The previous key stays in the verification
//! trust set until its grace deadline so signatures issued just before a
//! rotation keep verifying.
//!
//! ## Design Notes
//!
//! - **Atomic rotation**: the new key is fetched before the write lock is
//!   taken; all four state fields are then swapped under one guard, so readers
//!   see either the old or the new state.
//! - **Backend metadata wins**: creation/expiry reported by the backend are
//!   used as-is. Only when absent is creation taken as "now" and expiry as
//!   creation + rotation period + grace period.
//! - **No generation**: keys are provisioned by operators. `should_rotate`
//!   only reports that a rotation is due.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::{DateTime, Duration, Utc};
use docvault_audit_core::SharedClock;
use jsonwebtoken::EncodingKey;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{KeyError, Result};
use crate::jwks::JwkSet;
use crate::keypair::KeyPair;
use crate::traits::{KeyManager, KeyMetadata};

/// Default interval between rotations.
pub const DEFAULT_ROTATION_DAYS: i64 = 90;

/// Default time a retired key stays verifiable after rotation.
pub const DEFAULT_GRACE_DAYS: i64 = 30;

/// Configuration for [`KeyLifecycleManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Kid to sign with at startup.
    pub current_kid: String,
    pub rotation_period: Duration,
    pub grace_period: Duration,
}

impl LifecycleConfig {
    /// Config with the default 90-day rotation and 30-day grace periods.
    pub fn new(current_kid: impl Into<String>) -> Self {
        Self {
            current_kid: current_kid.into(),
            rotation_period: Duration::days(DEFAULT_ROTATION_DAYS),
            grace_period: Duration::days(DEFAULT_GRACE_DAYS),
        }
    }

    pub fn with_rotation_period(mut self, period: Duration) -> Self {
        self.rotation_period = period;
        self
    }

    pub fn with_grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.current_kid.is_empty() {
            return Err(KeyError::Configuration("current signing kid is empty".into()));
        }
        if self.rotation_period <= Duration::zero() {
            return Err(KeyError::Configuration("rotation period must be positive".into()));
        }
        if self.grace_period < Duration::zero() {
            return Err(KeyError::Configuration("grace period must not be negative".into()));
        }
        Ok(())
    }
}

/// Opaque handle for producing signatures with the current key.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    key: EncodingKey,
}

impl SigningKey {
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish()
    }
}

/// Outcome of a successful [`KeyLifecycleManager::rotate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationSummary {
    pub previous_kid: String,
    pub current_kid: String,
    /// When the retired key leaves the trust set.
    pub previous_valid_until: DateTime<Utc>,
    pub next_rotation: DateTime<Utc>,
}

/// Point-in-time view of the lifecycle state, without key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleSnapshot {
    pub backend: String,
    pub current_kid: String,
    pub previous_kid: Option<String>,
    pub next_rotation: DateTime<Utc>,
    pub keys: Vec<KeyStatus>,
}

/// One cached key as seen in a [`LifecycleSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub kid: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_expired: bool,
}

struct LifecycleState {
    current_kid: String,
    previous_kid: Option<String>,
    next_rotation: DateTime<Utc>,
    keys: HashMap<String, KeyPair>,
}

/// Tracks the signing key and its predecessor over a [`KeyManager`] backend.
pub struct KeyLifecycleManager {
    backend: Arc<dyn KeyManager>,
    config: LifecycleConfig,
    clock: SharedClock,
    state: RwLock<LifecycleState>,
}

impl KeyLifecycleManager {
    /// Load the configured current key and classify a previous key.
    ///
    /// Fails with `KeyUnavailable` if the current key cannot be loaded. A
    /// failure to list or load other keys only means there is no previous
    /// key.
    pub async fn initialize(
        backend: Arc<dyn KeyManager>,
        config: LifecycleConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;
        let now = clock.now();
        let current_kid = config.current_kid.clone();

        let private_key = backend.get_private_key(&current_kid).await.map_err(|e| {
            KeyError::KeyUnavailable(format!("current key {current_kid}: {e}"))
        })?;
        let meta = load_metadata(backend.as_ref(), &current_kid).await;
        let (created_at, expires_at) = resolve_times(&config, &current_kid, meta, now);
        let current =
            KeyPair::from_private(&current_kid, &private_key, created_at, expires_at).map_err(
                |e| KeyError::KeyUnavailable(format!("current key {current_kid}: {e}")),
            )?;

        if current.is_expired(now) {
            warn!(
                kid = %current_kid,
                expired_at = %current.expires_at(),
                "current signing key is past its expiry; rotate it"
            );
        }

        let mut keys = HashMap::new();
        keys.insert(current_kid.clone(), current.activated());

        let previous = find_previous(backend.as_ref(), &config, created_at, now).await;
        let previous_kid = previous.as_ref().map(|p| p.kid().to_string());
        if let Some(pair) = previous {
            keys.insert(pair.kid().to_string(), pair);
        }

        // An expiry set by the backend can bring the rotation forward.
        let next_rotation = (created_at + config.rotation_period).min(expires_at);
        info!(
            backend = backend.backend_name(),
            kid = %current_kid,
            previous = ?previous_kid,
            next_rotation = %next_rotation,
            "key lifecycle initialized"
        );

        Ok(Self {
            backend,
            config,
            clock,
            state: RwLock::new(LifecycleState {
                current_kid,
                previous_kid,
                next_rotation,
                keys,
            }),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, LifecycleState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn KeyManager> {
        &self.backend
    }

    pub fn current_kid(&self) -> String {
        self.read().current_kid.clone()
    }

    pub fn previous_kid(&self) -> Option<String> {
        self.read().previous_kid.clone()
    }

    pub fn next_rotation(&self) -> DateTime<Utc> {
        self.read().next_rotation
    }

    /// Whether the rotation deadline has passed.
    pub fn should_rotate(&self) -> bool {
        self.clock.now() >= self.read().next_rotation
    }

    /// Handle for signing with the current key.
    pub fn signing_key(&self) -> Result<SigningKey> {
        let state = self.read();
        let pair = state
            .keys
            .get(&state.current_kid)
            .ok_or_else(|| KeyError::KeyUnavailable(state.current_kid.clone()))?;
        let key = pair
            .encoding_key()
            .ok_or_else(|| KeyError::KeyUnavailable(format!("{} cannot sign", pair.kid())))?;
        Ok(SigningKey {
            kid: pair.kid().to_string(),
            key: key.clone(),
        })
    }

    /// Cached key pair for `kid`, whether or not it is still trusted.
    pub fn get_key_pair(&self, kid: &str) -> Option<KeyPair> {
        self.read().keys.get(kid).cloned()
    }

    /// The key for verifying a signature made under `kid`.
    ///
    /// Only keys in the current trust set qualify; anything else is
    /// `KeyUnavailable`.
    pub fn verification_key(&self, kid: &str) -> Result<KeyPair> {
        let now = self.clock.now();
        self.active_keys_at(now)
            .into_iter()
            .find(|k| k.kid() == kid)
            .ok_or_else(|| KeyError::KeyUnavailable(format!("{kid} is not in the trust set")))
    }

    /// Current key plus the previous key if it has not expired.
    pub fn get_all_active_keys(&self) -> Vec<KeyPair> {
        self.active_keys_at(self.clock.now())
    }

    fn active_keys_at(&self, now: DateTime<Utc>) -> Vec<KeyPair> {
        let state = self.read();
        let mut active = Vec::with_capacity(2);
        if let Some(current) = state.keys.get(&state.current_kid) {
            active.push(current.clone());
        }
        if let Some(prev) = state.previous_kid.as_ref().and_then(|k| state.keys.get(k)) {
            if !prev.is_expired(now) {
                active.push(prev.clone());
            }
        }
        active
    }

    /// JWKS of exactly the trust set.
    pub fn get_jwks(&self) -> JwkSet {
        JwkSet {
            keys: self
                .get_all_active_keys()
                .iter()
                .map(|k| k.jwk().clone())
                .collect(),
        }
    }

    /// Make `new_kid` the signing key and demote the current one.
    pub async fn rotate(&self, new_kid: &str) -> Result<RotationSummary> {
        if new_kid.is_empty() {
            return Err(KeyError::RotationRejected("new kid is empty".into()));
        }
        if self.read().current_kid == new_kid {
            return Err(KeyError::RotationRejected(format!(
                "{new_kid} is already the current key"
            )));
        }

        // Fetch outside the lock; the backend may be remote.
        let private_key = self.backend.get_private_key(new_kid).await?;
        let meta = load_metadata(self.backend.as_ref(), new_kid).await;
        let now = self.clock.now();
        let (created_at, expires_at) = resolve_times(&self.config, new_kid, meta, now);
        if expires_at <= now {
            return Err(KeyError::RotationRejected(format!(
                "{new_kid} expired at {expires_at}"
            )));
        }
        let incoming = KeyPair::from_private(new_kid, &private_key, created_at, expires_at)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.current_kid == new_kid {
            return Err(KeyError::RotationRejected(format!(
                "{new_kid} is already the current key"
            )));
        }

        let old_kid = state.current_kid.clone();
        let grace_deadline = now + self.config.grace_period;
        let retired = state
            .keys
            .get(&old_kid)
            .map(|k| k.retired(grace_deadline))
            .ok_or_else(|| KeyError::KeyUnavailable(old_kid.clone()))?;
        let previous_valid_until = retired.expires_at();
        let next_rotation = (now + self.config.rotation_period).min(expires_at);

        state.keys.clear();
        state.keys.insert(old_kid.clone(), retired);
        state.keys.insert(new_kid.to_string(), incoming.activated());
        state.previous_kid = Some(old_kid.clone());
        state.current_kid = new_kid.to_string();
        state.next_rotation = next_rotation;
        drop(state);

        info!(
            from = %old_kid,
            to = %new_kid,
            previous_valid_until = %previous_valid_until,
            next_rotation = %next_rotation,
            "signing key rotated"
        );

        Ok(RotationSummary {
            previous_kid: old_kid,
            current_kid: new_kid.to_string(),
            previous_valid_until,
            next_rotation,
        })
    }

    /// Diagnostic view of the state.
    pub fn snapshot(&self) -> LifecycleSnapshot {
        let now = self.clock.now();
        let state = self.read();
        let mut keys: Vec<KeyStatus> = state
            .keys
            .values()
            .map(|k| KeyStatus {
                kid: k.kid().to_string(),
                created_at: k.created_at(),
                expires_at: k.expires_at(),
                is_active: k.is_active(),
                is_expired: k.is_expired(now),
            })
            .collect();
        keys.sort_by(|a, b| b.is_active.cmp(&a.is_active).then(a.kid.cmp(&b.kid)));

        LifecycleSnapshot {
            backend: self.backend.backend_name().to_string(),
            current_kid: state.current_kid.clone(),
            previous_kid: state.previous_kid.clone(),
            next_rotation: state.next_rotation,
            keys,
        }
    }
}

impl fmt::Debug for KeyLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("KeyLifecycleManager")
            .field("backend", &self.backend.backend_name())
            .field("current_kid", &state.current_kid)
            .field("previous_kid", &state.previous_kid)
            .field("next_rotation", &state.next_rotation)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn load_metadata(backend: &dyn KeyManager, kid: &str) -> KeyMetadata {
    match backend.key_metadata(kid).await {
        Ok(meta) => meta,
        Err(e) => {
            warn!(kid, error = %e, "key metadata unavailable, approximating");
            KeyMetadata::default()
        }
    }
}

fn resolve_times(
    config: &LifecycleConfig,
    kid: &str,
    meta: KeyMetadata,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let created_at = meta.created_at.unwrap_or_else(|| {
        debug!(kid, "no creation time from backend, using load time");
        now
    });
    let expires_at = meta.expires_at.unwrap_or_else(|| {
        debug!(kid, "no expiry from backend, deriving from rotation and grace periods");
        created_at + config.rotation_period + config.grace_period
    });
    (created_at, expires_at)
}

/// The most recently created other key that loads, is still unexpired and
/// is not newer than the current key.
///
/// It was retired when the current key was created, so its grace deadline is
/// counted from `current_created_at`. Keys created after the current one are
/// staged for a future rotation and never count as previous.
async fn find_previous(
    backend: &dyn KeyManager,
    config: &LifecycleConfig,
    current_created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<KeyPair> {
    let kids = match backend.list_kids().await {
        Ok(kids) => kids,
        Err(e) => {
            warn!(error = %e, "could not list keys, no previous key");
            return None;
        }
    };

    let mut best: Option<KeyPair> = None;
    for kid in kids.iter().filter(|k| **k != config.current_kid) {
        let public_key = match backend.get_public_key(kid).await {
            Ok(key) => key,
            Err(e) => {
                debug!(kid = %kid, error = %e, "skipping unloadable key");
                continue;
            }
        };
        let meta = load_metadata(backend, kid).await;
        let (created_at, expires_at) = resolve_times(config, kid, meta, now);
        if created_at > current_created_at {
            debug!(kid = %kid, "skipping key staged after the current one");
            continue;
        }
        let pair = match KeyPair::from_public(kid.as_str(), public_key, created_at, expires_at) {
            Ok(pair) => pair.retired(current_created_at + config.grace_period),
            Err(e) => {
                debug!(kid = %kid, error = %e, "skipping unusable key");
                continue;
            }
        };
        if pair.is_expired(now) {
            continue;
        }
        if best
            .as_ref()
            .map_or(true, |b| pair.created_at() > b.created_at())
        {
            best = Some(pair);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKeyManager;
    use crate::test_util::{test_key, weak_key};
    use chrono::TimeZone;
    use docvault_audit_core::ManualClock;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn meta(created: DateTime<Utc>, expires: Option<DateTime<Utc>>) -> KeyMetadata {
        KeyMetadata {
            created_at: Some(created),
            expires_at: expires,
        }
    }

    async fn manager_with(
        backend: Arc<MemoryKeyManager>,
        kid: &str,
    ) -> (KeyLifecycleManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let mgr = KeyLifecycleManager::initialize(backend, LifecycleConfig::new(kid), clock.clone())
            .await
            .unwrap();
        (mgr, clock)
    }

    #[tokio::test]
    async fn test_initialize_single_key() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("k1", test_key(0).clone());
        let (mgr, _clock) = manager_with(backend, "k1").await;

        assert_eq!(mgr.current_kid(), "k1");
        assert!(mgr.previous_kid().is_none());
        // No metadata: created now, rotation due after 90 days.
        assert_eq!(mgr.next_rotation(), t0() + Duration::days(90));
        let pair = mgr.get_key_pair("k1").unwrap();
        assert_eq!(pair.expires_at(), t0() + Duration::days(120));
        assert!(pair.is_active());
        assert_eq!(mgr.signing_key().unwrap().kid(), "k1");
    }

    #[tokio::test]
    async fn test_initialize_missing_current_is_unavailable() {
        let backend = Arc::new(MemoryKeyManager::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let err = KeyLifecycleManager::initialize(backend, LifecycleConfig::new("k1"), clock)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::KeyUnavailable(_)));
    }

    #[tokio::test]
    async fn test_initialize_weak_current_is_unavailable() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("weak", weak_key().clone());
        let clock = Arc::new(ManualClock::new(t0()));
        let err = KeyLifecycleManager::initialize(backend, LifecycleConfig::new("weak"), clock)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::KeyUnavailable(_)));
    }

    #[test]
    fn test_config_validate() {
        assert!(LifecycleConfig::new("k1").validate().is_ok());
        assert!(LifecycleConfig::new("").validate().is_err());
        assert!(LifecycleConfig::new("k1")
            .with_rotation_period(Duration::zero())
            .validate()
            .is_err());
        assert!(LifecycleConfig::new("k1")
            .with_grace_period(Duration::days(-1))
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_initialize_classifies_newest_unexpired_previous() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert_with_metadata("k3", test_key(2).clone(), meta(t0() - Duration::days(1), None));
        backend.insert_with_metadata(
            "k2",
            test_key(1).clone(),
            meta(t0() - Duration::days(80), Some(t0() + Duration::days(60))),
        );
        backend.insert_with_metadata(
            "k1",
            test_key(0).clone(),
            meta(t0() - Duration::days(200), Some(t0() - Duration::days(10))),
        );

        let (mgr, _clock) = manager_with(backend, "k3").await;
        assert_eq!(mgr.current_kid(), "k3");
        assert_eq!(mgr.previous_kid().as_deref(), Some("k2"));
        assert_eq!(mgr.next_rotation(), t0() - Duration::days(1) + Duration::days(90));

        let prev = mgr.get_key_pair("k2").unwrap();
        assert!(!prev.is_active());
        assert!(!prev.can_sign());
        // Grace counted from k3's creation.
        assert_eq!(prev.expires_at(), t0() - Duration::days(1) + Duration::days(30));

        let kids: Vec<String> = mgr
            .get_all_active_keys()
            .iter()
            .map(|k| k.kid().to_string())
            .collect();
        assert_eq!(kids, vec!["k3", "k2"]);
    }

    #[tokio::test]
    async fn test_initialize_ignores_key_staged_after_current() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert_with_metadata("k2", test_key(1).clone(), meta(t0() - Duration::days(5), None));
        backend.insert_with_metadata("k1", test_key(0).clone(), meta(t0() - Duration::days(40), None));
        // Uploaded ahead of the next rotation.
        backend.insert_with_metadata("k3", test_key(2).clone(), meta(t0() - Duration::days(1), None));

        let (mgr, _clock) = manager_with(backend, "k2").await;
        assert_eq!(mgr.previous_kid().as_deref(), Some("k1"));
        assert!(mgr.get_key_pair("k3").is_none());
        assert_eq!(mgr.get_jwks().kids(), vec!["k2", "k1"]);
    }

    #[tokio::test]
    async fn test_initialize_with_expired_current_flags_rotation() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert_with_metadata(
            "k1",
            test_key(0).clone(),
            meta(t0() - Duration::days(10), Some(t0() - Duration::days(1))),
        );

        let (mgr, _clock) = manager_with(backend, "k1").await;
        assert_eq!(mgr.current_kid(), "k1");
        assert_eq!(mgr.next_rotation(), t0() - Duration::days(1));
        assert!(mgr.should_rotate());
    }

    #[tokio::test]
    async fn test_initialize_skips_expired_previous() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("k2", test_key(1).clone());
        backend.insert_with_metadata(
            "k1",
            test_key(0).clone(),
            meta(t0() - Duration::days(200), Some(t0() - Duration::days(1))),
        );
        let (mgr, _clock) = manager_with(backend, "k2").await;
        assert!(mgr.previous_kid().is_none());
        assert_eq!(mgr.get_jwks().kids(), vec!["k2"]);
    }

    #[tokio::test]
    async fn test_rotate_swaps_and_keeps_previous_in_grace() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("k1", test_key(0).clone());
        backend.insert("k2", test_key(1).clone());
        let (mgr, clock) = manager_with(backend, "k1").await;
        clock.advance(Duration::days(5));

        let summary = mgr.rotate("k2").await.unwrap();
        let now = t0() + Duration::days(5);
        assert_eq!(summary.previous_kid, "k1");
        assert_eq!(summary.current_kid, "k2");
        assert_eq!(summary.previous_valid_until, now + Duration::days(30));
        assert_eq!(summary.next_rotation, now + Duration::days(90));

        assert_eq!(mgr.current_kid(), "k2");
        assert_eq!(mgr.previous_kid().as_deref(), Some("k1"));
        assert_eq!(mgr.signing_key().unwrap().kid(), "k2");
        assert_eq!(mgr.get_jwks().kids(), vec!["k2", "k1"]);
        assert!(mgr.verification_key("k1").is_ok());

        clock.advance(Duration::days(30));
        assert_eq!(mgr.get_jwks().kids(), vec!["k2"]);
        assert!(matches!(
            mgr.verification_key("k1"),
            Err(KeyError::KeyUnavailable(_))
        ));
        assert!(mgr.verification_key("k2").is_ok());
    }

    #[tokio::test]
    async fn test_rotate_grace_capped_by_own_expiry() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert_with_metadata("k1", test_key(0).clone(), meta(t0(), Some(t0() + Duration::days(10))));
        backend.insert("k2", test_key(1).clone());
        let (mgr, _clock) = manager_with(backend, "k1").await;

        let summary = mgr.rotate("k2").await.unwrap();
        assert_eq!(summary.previous_valid_until, t0() + Duration::days(10));
    }

    #[tokio::test]
    async fn test_rotate_twice_drops_oldest() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("k1", test_key(0).clone());
        backend.insert("k2", test_key(1).clone());
        backend.insert("k3", test_key(2).clone());
        let (mgr, _clock) = manager_with(backend, "k1").await;

        mgr.rotate("k2").await.unwrap();
        mgr.rotate("k3").await.unwrap();
        assert_eq!(mgr.previous_kid().as_deref(), Some("k2"));
        assert!(mgr.get_key_pair("k1").is_none());
        assert!(matches!(
            mgr.verification_key("k1"),
            Err(KeyError::KeyUnavailable(_))
        ));
        assert_eq!(mgr.snapshot().keys.len(), 2);
    }

    #[tokio::test]
    async fn test_rotate_rejections() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("k1", test_key(0).clone());
        backend.insert_with_metadata(
            "old",
            test_key(1).clone(),
            meta(t0() - Duration::days(400), Some(t0() - Duration::days(1))),
        );
        let (mgr, _clock) = manager_with(backend, "k1").await;

        assert!(matches!(
            mgr.rotate("k1").await,
            Err(KeyError::RotationRejected(_))
        ));
        assert!(matches!(mgr.rotate("nope").await, Err(KeyError::NotFound(_))));
        assert!(matches!(
            mgr.rotate("old").await,
            Err(KeyError::RotationRejected(_))
        ));
        // Failed rotations leave state untouched.
        assert_eq!(mgr.current_kid(), "k1");
    }

    #[tokio::test]
    async fn test_should_rotate() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("k1", test_key(0).clone());
        let (mgr, clock) = manager_with(backend, "k1").await;

        assert!(!mgr.should_rotate());
        clock.advance(Duration::days(90));
        assert!(mgr.should_rotate());
    }

    #[tokio::test]
    async fn test_snapshot_has_no_key_material() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("k1", test_key(0).clone());
        let (mgr, _clock) = manager_with(backend, "k1").await;

        let snap = mgr.snapshot();
        assert_eq!(snap.backend, "memory");
        assert_eq!(snap.current_kid, "k1");
        assert_eq!(snap.keys.len(), 1);
        assert!(snap.keys[0].is_active);

        let json = serde_json::to_string(&snap).unwrap();
        assert!(!json.contains("BEGIN"));
    }

    #[tokio::test]
    async fn test_concurrent_readers_during_rotation() {
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("k1", test_key(0).clone());
        backend.insert("k2", test_key(1).clone());
        let (mgr, _clock) = manager_with(backend, "k1").await;
        let mgr = Arc::new(mgr);

        let mut readers = Vec::new();
        for _ in 0..4 {
            let mgr = mgr.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let jwks = mgr.get_jwks();
                    assert!(!jwks.keys.is_empty());
                    assert!(jwks.find(&mgr.signing_key().unwrap().kid().to_string()).is_some()
                        || mgr.current_kid() == "k2");
                    tokio::task::yield_now().await;
                }
            }));
        }
        mgr.rotate("k2").await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
        assert_eq!(mgr.current_kid(), "k2");
    }
}
