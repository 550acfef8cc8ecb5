//! Deterministic RSA keys for tests.
//!
//! Generation is slow, so each key is made once per process. Enabled for this
//! crate's own tests and, through the `test-util` feature, for dependents.

use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

/// Number of distinct keys [`test_key`] can hand out.
pub const TEST_KEY_COUNT: usize = 4;

static KEYS: [OnceLock<RsaPrivateKey>; TEST_KEY_COUNT] = [
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
];
static WEAK: OnceLock<RsaPrivateKey> = OnceLock::new();

/// Deterministic 2048-bit key number `index`.
///
/// # Panics
///
/// If `index >= TEST_KEY_COUNT`.
pub fn test_key(index: usize) -> &'static RsaPrivateKey {
    KEYS[index].get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(0xA0D1_7000 + index as u64);
        RsaPrivateKey::new(&mut rng, 2048).expect("generate test key")
    })
}

/// A 1024-bit key, below the accepted minimum.
pub fn weak_key() -> &'static RsaPrivateKey {
    WEAK.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(0xBAD);
        RsaPrivateKey::new(&mut rng, 1024).expect("generate weak key")
    })
}

/// PKCS#8 PEM of [`test_key`] `index`, for file-backed tests.
pub fn test_key_pem(index: usize) -> String {
    test_key(index)
        .to_pkcs8_pem(LineEnding::LF)
        .expect("encode test key")
        .to_string()
}
