//! JSON Web Key Set export of RSA verification keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

/// The only signing algorithm this crate issues or accepts.
pub const SIGNING_ALGORITHM: &str = "RS256";

/// One RSA public key in JWK form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    /// Modulus, base64url big-endian, zero-padded to the key byte length.
    pub n: String,
    /// Public exponent, base64url big-endian.
    pub e: String,
}

impl Jwk {
    /// Describe `key` as a signature-verification JWK.
    pub fn from_public_key(kid: impl Into<String>, key: &RsaPublicKey) -> Self {
        let size = key.size();
        let mut n = key.n().to_bytes_be();
        if n.len() < size {
            let mut padded = vec![0u8; size - n.len()];
            padded.extend_from_slice(&n);
            n = padded;
        }

        Self {
            kty: "RSA".to_string(),
            kid: kid.into(),
            key_use: "sig".to_string(),
            alg: SIGNING_ALGORITHM.to_string(),
            n: URL_SAFE_NO_PAD.encode(n),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }
    }
}

/// A JWKS document: `{"keys": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Look up a key by id.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Key ids in document order.
    pub fn kids(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.kid.as_str()).collect()
    }
}
