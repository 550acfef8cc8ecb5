//! Loaded key pairs and RSA PEM parsing.

use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{KeyError, Result};
use crate::jwks::Jwk;

/// Smallest accepted RSA modulus.
pub const MIN_RSA_BITS: usize = 2048;

/// Parse a PKCS#8 or PKCS#1 PEM private key and check its size.
pub fn parse_private_key_pem(kid: &str, pem: &str) -> Result<RsaPrivateKey> {
    let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
        Ok(key) => key,
        Err(_) => RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| KeyError::InvalidKey {
            kid: kid.to_string(),
            reason: e.to_string(),
        })?,
    };
    ensure_key_size(kid, &key.to_public_key())?;
    Ok(key)
}

/// Parse an SPKI or PKCS#1 PEM public key and check its size.
pub fn parse_public_key_pem(kid: &str, pem: &str) -> Result<RsaPublicKey> {
    let key = match RsaPublicKey::from_public_key_pem(pem) {
        Ok(key) => key,
        Err(_) => RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| KeyError::InvalidKey {
            kid: kid.to_string(),
            reason: e.to_string(),
        })?,
    };
    ensure_key_size(kid, &key)?;
    Ok(key)
}

/// Reject keys below [`MIN_RSA_BITS`].
pub fn ensure_key_size(kid: &str, key: &RsaPublicKey) -> Result<()> {
    let bits = key.size() * 8;
    if bits < MIN_RSA_BITS {
        return Err(KeyError::KeyTooSmall {
            kid: kid.to_string(),
            bits,
            min: MIN_RSA_BITS,
        });
    }
    Ok(())
}

/// A key loaded into the lifecycle cache.
///
/// The private half is held only as an opaque [`EncodingKey`]; there is no
/// accessor that returns raw private key material.
#[derive(Clone)]
pub struct KeyPair {
    kid: String,
    encoding_key: Option<EncodingKey>,
    public_key: RsaPublicKey,
    decoding_key: DecodingKey,
    jwk: Jwk,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_active: bool,
}

impl KeyPair {
    /// Build a signing-capable pair from a private key.
    pub fn from_private(
        kid: impl Into<String>,
        private_key: &RsaPrivateKey,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self> {
        let kid = kid.into();
        let der = private_key
            .to_pkcs1_der()
            .map_err(|e| KeyError::InvalidKey {
                kid: kid.clone(),
                reason: e.to_string(),
            })?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());
        let mut pair = Self::from_public(kid, private_key.to_public_key(), created_at, expires_at)?;
        pair.encoding_key = Some(encoding_key);
        Ok(pair)
    }

    /// Build a verify-only pair from a public key.
    pub fn from_public(
        kid: impl Into<String>,
        public_key: RsaPublicKey,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self> {
        let kid = kid.into();
        ensure_key_size(&kid, &public_key)?;
        let jwk = Jwk::from_public_key(kid.clone(), &public_key);
        let decoding_key =
            DecodingKey::from_rsa_components(&jwk.n, &jwk.e).map_err(|e| KeyError::InvalidKey {
                kid: kid.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            kid,
            encoding_key: None,
            public_key,
            decoding_key,
            jwk,
            created_at,
            expires_at,
            is_active: false,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Whether this pair can produce signatures.
    pub fn can_sign(&self) -> bool {
        self.encoding_key.is_some()
    }

    /// Whether the key is past its verification deadline at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub(crate) fn encoding_key(&self) -> Option<&EncodingKey> {
        self.encoding_key.as_ref()
    }

    /// Verification handle for this key.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Copy marked as the active signer.
    pub(crate) fn activated(&self) -> Self {
        let mut pair = self.clone();
        pair.is_active = true;
        pair
    }

    /// Copy marked inactive, verifiable until `valid_until` at the latest.
    pub(crate) fn retired(&self, valid_until: DateTime<Utc>) -> Self {
        let mut pair = self.clone();
        pair.is_active = false;
        pair.expires_at = pair.expires_at.min(valid_until);
        pair
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("kid", &self.kid)
            .field("can_sign", &self.can_sign())
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("is_active", &self.is_active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{test_key, weak_key};
    use chrono::Duration;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    #[test]
    fn test_parse_pkcs8_and_pkcs1_private() {
        let key = test_key(0);
        let pkcs8 = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let pkcs1 = key.to_pkcs1_pem(LineEnding::LF).unwrap();

        assert_eq!(parse_private_key_pem("k", &pkcs8).unwrap(), *key);
        assert_eq!(parse_private_key_pem("k", &pkcs1).unwrap(), *key);
    }

    #[test]
    fn test_parse_public_formats() {
        let public = test_key(0).to_public_key();
        let spki = public.to_public_key_pem(LineEnding::LF).unwrap();
        let pkcs1 = public.to_pkcs1_pem(LineEnding::LF).unwrap();

        assert_eq!(parse_public_key_pem("k", &spki).unwrap(), public);
        assert_eq!(parse_public_key_pem("k", &pkcs1).unwrap(), public);
    }

    #[test]
    fn test_garbage_pem_is_invalid_key() {
        let err = parse_private_key_pem("k", "-----BEGIN NOTHING-----").unwrap_err();
        assert!(matches!(err, KeyError::InvalidKey { .. }));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_small_key_rejected() {
        let err = ensure_key_size("weak", &weak_key().to_public_key()).unwrap_err();
        assert!(matches!(err, KeyError::KeyTooSmall { bits: 1024, .. }));
    }

    #[test]
    fn test_keypair_expiry_and_retire() {
        let now = Utc::now();
        let pair =
            KeyPair::from_private("k1", test_key(0), now, now + Duration::days(90)).unwrap();
        assert!(pair.can_sign());
        assert!(!pair.is_active());
        assert!(pair.activated().is_active());

        let retired = pair.activated().retired(now + Duration::days(7));
        assert!(!retired.is_active());
        assert_eq!(retired.expires_at(), now + Duration::days(7));
        assert!(!retired.is_expired(now + Duration::days(6)));
        assert!(retired.is_expired(now + Duration::days(7)));

        // Retiring never extends the original expiry.
        let retired = pair.retired(now + Duration::days(365));
        assert_eq!(retired.expires_at(), now + Duration::days(90));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let now = Utc::now();
        let pair = KeyPair::from_private("k1", test_key(0), now, now).unwrap();
        let debug = format!("{pair:?}");
        assert!(debug.contains("k1"));
        assert!(!debug.contains("BEGIN"));
    }
}
