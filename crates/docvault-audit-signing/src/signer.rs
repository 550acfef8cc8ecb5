//! The EvidenceSigner trait and its RS256 JWS implementation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docvault_audit_core::{Evidence, SharedClock};
use docvault_audit_keys::{JwkSet, KeyLifecycleManager, SIGNING_ALGORITHM};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use tracing::debug;

use crate::claims::{EvidenceClaims, TokenHeader};
use crate::error::{Result, SigningError};

/// Evidence recovered from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEvidence {
    pub evidence: Evidence,
    /// Key that produced the signature.
    pub kid: String,
    pub issued_at: DateTime<Utc>,
}

/// Signs and verifies evidence tokens.
///
/// Implementations are interchangeable; callers only see compact tokens and
/// the JWKS of the keys that currently verify.
pub trait EvidenceSigner: Send + Sync {
    /// Sign `evidence` with the current key.
    fn sign_evidence(&self, evidence: &Evidence) -> Result<String>;

    /// Verify `token` against the trust set and decode its evidence.
    fn verify_evidence(&self, token: &str) -> Result<VerifiedEvidence>;

    /// JWKS of the keys that currently verify.
    fn current_jwks(&self) -> JwkSet;

    /// Validate the raw fields, then sign.
    fn sign(&self, document_id: &str, sha256_hex: &str, timestamp: DateTime<Utc>) -> Result<String> {
        let evidence = Evidence::new(document_id, sha256_hex, timestamp)?;
        self.sign_evidence(&evidence)
    }
}

/// RS256 compact JWS signer backed by a [`KeyLifecycleManager`].
pub struct JwsEvidenceSigner {
    keys: Arc<KeyLifecycleManager>,
    clock: SharedClock,
}

impl JwsEvidenceSigner {
    pub fn new(keys: Arc<KeyLifecycleManager>, clock: SharedClock) -> Self {
        Self { keys, clock }
    }

    pub fn keys(&self) -> &Arc<KeyLifecycleManager> {
        &self.keys
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        // Evidence tokens carry no exp/nbf/aud; key expiry bounds their life.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation
    }
}

impl EvidenceSigner for JwsEvidenceSigner {
    fn sign_evidence(&self, evidence: &Evidence) -> Result<String> {
        // Re-validate: the fields are public and may have been edited.
        let evidence = Evidence::new(
            evidence.document_id.clone(),
            &evidence.sha256,
            evidence.timestamp,
        )?;

        let key = self.keys.signing_key()?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid().to_string());
        header.typ = Some("JWT".to_string());

        let claims = EvidenceClaims::new(&evidence, self.clock.now());
        let token = jsonwebtoken::encode(&header, &claims, key.encoding_key())
            .map_err(|e| SigningError::Encoding(e.to_string()))?;

        debug!(kid = key.kid(), document_id = %evidence.document_id, "evidence signed");
        Ok(token)
    }

    fn verify_evidence(&self, token: &str) -> Result<VerifiedEvidence> {
        let header = TokenHeader::peek(token)?;

        // Checked before any key lookup so `none` and HMAC tokens never reach
        // a verifier.
        match header.alg.as_deref() {
            Some(SIGNING_ALGORITHM) => {}
            Some(other) => {
                return Err(SigningError::InvalidSignature(format!(
                    "algorithm {other} is not accepted"
                )))
            }
            None => return Err(SigningError::InvalidSignature("missing algorithm".into())),
        }

        let kid = header
            .kid
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SigningError::MalformedToken("missing kid".into()))?;
        let pair = self.keys.verification_key(&kid)?;

        let data = jsonwebtoken::decode::<EvidenceClaims>(
            token,
            pair.decoding_key(),
            &Self::validation(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::MissingRequiredClaim(_) => SigningError::MalformedToken(e.to_string()),
            _ => SigningError::InvalidSignature(e.to_string()),
        })?;

        let (evidence, issued_at) = data.claims.into_parts()?;
        Ok(VerifiedEvidence {
            evidence,
            kid,
            issued_at,
        })
    }

    fn current_jwks(&self) -> JwkSet {
        self.keys.get_jwks()
    }
}
