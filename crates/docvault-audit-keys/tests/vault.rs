//! VaultKeyManager against an in-process mock of the KV v2 HTTP API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, TimeZone, Utc};
use docvault_audit_core::ManualClock;
use docvault_audit_keys::{
    KeyError, KeyLifecycleManager, KeyManager, LifecycleConfig, VaultConfig, VaultKeyManager,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

const TOKEN: &str = "s.test-token";

fn key(index: usize) -> &'static RsaPrivateKey {
    static KEYS: [OnceLock<RsaPrivateKey>; 2] = [OnceLock::new(), OnceLock::new()];
    KEYS[index].get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(0x5EC2_E700 + index as u64);
        RsaPrivateKey::new(&mut rng, 2048).unwrap()
    })
}

fn pem(index: usize) -> String {
    key(index).to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
}

#[derive(Clone, Default)]
struct MockVault {
    secrets: Arc<Mutex<HashMap<String, Value>>>,
    namespaces: Arc<Mutex<Vec<String>>>,
}

impl MockVault {
    fn put(&self, kid: &str, secret: Value) {
        self.secrets.lock().unwrap().insert(kid.to_string(), secret);
    }
}

fn authorized(state: &MockVault, headers: &HeaderMap) -> bool {
    if let Some(ns) = headers.get("x-vault-namespace").and_then(|v| v.to_str().ok()) {
        state.namespaces.lock().unwrap().push(ns.to_string());
    }
    headers
        .get("x-vault-token")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|t| t == TOKEN)
}

async fn read_secret(
    State(state): State<MockVault>,
    Path(kid): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&state, &headers) {
        return Err(StatusCode::FORBIDDEN);
    }
    let secrets = state.secrets.lock().unwrap();
    let secret = secrets.get(&kid).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({
        "data": { "data": secret, "metadata": { "version": 1 } }
    })))
}

async fn list_secrets(
    State(state): State<MockVault>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&state, &headers) {
        return Err(StatusCode::FORBIDDEN);
    }
    if query.get("list").map(String::as_str) != Some("true") {
        return Err(StatusCode::METHOD_NOT_ALLOWED);
    }
    let secrets = state.secrets.lock().unwrap();
    if secrets.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    let mut keys: Vec<String> = secrets.keys().cloned().collect();
    keys.push("archive/".to_string());
    Ok(Json(json!({ "data": { "keys": keys } })))
}

async fn health() -> Json<Value> {
    Json(json!({ "initialized": true, "sealed": false }))
}

async fn spawn_vault(state: MockVault) -> String {
    let app = Router::new()
        .route(
            "/v1/secret/data/docvault/signing-keys/{kid}",
            get(read_secret),
        )
        .route(
            "/v1/secret/metadata/docvault/signing-keys",
            get(list_secrets),
        )
        .route("/v1/sys/health", get(health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_vault_reads_keys_and_metadata() {
    let vault = MockVault::default();
    vault.put(
        "k1",
        json!({
            "private_key": pem(0),
            "created_at": "2025-01-01T00:00:00Z",
            "expires_at": "2025-06-01T00:00:00Z",
        }),
    );
    let addr = spawn_vault(vault).await;

    let km = VaultKeyManager::new(VaultConfig::new(addr, TOKEN)).unwrap();
    assert!(km.is_available().await);
    assert_eq!(km.backend_name(), "vault");

    assert_eq!(km.get_private_key("k1").await.unwrap(), *key(0));
    assert_eq!(km.get_public_key("k1").await.unwrap(), key(0).to_public_key());

    let meta = km.key_metadata("k1").await.unwrap();
    assert_eq!(
        meta.created_at,
        Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(
        meta.expires_at,
        Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
    );

    // Sub-folders are not keys.
    assert_eq!(km.list_kids().await.unwrap(), vec!["k1".to_string()]);
}

#[tokio::test]
async fn test_vault_missing_and_empty() {
    let addr = spawn_vault(MockVault::default()).await;
    let km = VaultKeyManager::new(VaultConfig::new(addr, TOKEN)).unwrap();

    assert!(km.list_kids().await.unwrap().is_empty());
    assert!(matches!(
        km.get_private_key("nope").await,
        Err(KeyError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_vault_bad_token_is_backend_error() {
    let vault = MockVault::default();
    vault.put("k1", json!({ "private_key": pem(0) }));
    let addr = spawn_vault(vault).await;

    let km = VaultKeyManager::new(VaultConfig::new(addr, "wrong")).unwrap();
    assert!(matches!(
        km.get_private_key("k1").await,
        Err(KeyError::Backend(_))
    ));
    assert!(matches!(km.list_kids().await, Err(KeyError::Backend(_))));
}

#[tokio::test]
async fn test_vault_malformed_key_material() {
    let vault = MockVault::default();
    vault.put("bad", json!({ "private_key": "not a pem" }));
    let addr = spawn_vault(vault).await;

    let km = VaultKeyManager::new(VaultConfig::new(addr, TOKEN)).unwrap();
    assert!(matches!(
        km.get_private_key("bad").await,
        Err(KeyError::InvalidKey { .. })
    ));
}

#[tokio::test]
async fn test_vault_sends_namespace() {
    let vault = MockVault::default();
    vault.put("k1", json!({ "private_key": pem(0) }));
    let addr = spawn_vault(vault.clone()).await;

    let km =
        VaultKeyManager::new(VaultConfig::new(addr, TOKEN).with_namespace("tenant-a")).unwrap();
    km.get_private_key("k1").await.unwrap();
    assert!(vault
        .namespaces
        .lock()
        .unwrap()
        .iter()
        .any(|ns| ns == "tenant-a"));
}

#[tokio::test]
async fn test_vault_unreachable() {
    // Nothing listens on the discard port.
    let km = VaultKeyManager::new(VaultConfig::new("http://127.0.0.1:9", TOKEN)).unwrap();
    assert!(!km.is_available().await);
    assert!(matches!(km.list_kids().await, Err(KeyError::Backend(_))));
}

#[tokio::test]
async fn test_lifecycle_over_vault() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let vault = MockVault::default();
    vault.put(
        "k1",
        json!({ "private_key": pem(0), "created_at": "2025-01-01T00:00:00Z" }),
    );
    vault.put(
        "k2",
        json!({ "private_key": pem(1), "created_at": "2025-02-20T00:00:00Z" }),
    );
    let addr = spawn_vault(vault).await;

    let backend = Arc::new(VaultKeyManager::new(VaultConfig::new(addr, TOKEN)).unwrap());
    let clock = Arc::new(ManualClock::new(now));
    let keys = KeyLifecycleManager::initialize(backend, LifecycleConfig::new("k2"), clock.clone())
        .await
        .unwrap();

    assert_eq!(keys.current_kid(), "k2");
    assert_eq!(keys.previous_kid().as_deref(), Some("k1"));
    assert_eq!(
        keys.next_rotation(),
        Utc.with_ymd_and_hms(2025, 2, 20, 0, 0, 0).unwrap() + Duration::days(90)
    );
    assert_eq!(keys.get_jwks().kids(), vec!["k2", "k1"]);

    let summary = keys.rotate("k1").await.unwrap();
    assert_eq!(summary.previous_kid, "k2");
    assert_eq!(keys.signing_key().unwrap().kid(), "k1");
}
