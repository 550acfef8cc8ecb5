//! Token claims and header inspection.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use docvault_audit_core::Evidence;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SigningError};

/// Render a timestamp the way tokens carry it: RFC 3339, UTC, milliseconds.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SigningError::MalformedToken(format!("{field}: {e}")))
}

/// Payload of an evidence token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceClaims {
    pub document_id: String,
    pub sha256: String,
    pub timestamp: String,
    pub issued_at: String,
}

impl EvidenceClaims {
    pub fn new(evidence: &Evidence, issued_at: DateTime<Utc>) -> Self {
        Self {
            document_id: evidence.document_id.clone(),
            sha256: evidence.sha256.clone(),
            timestamp: format_timestamp(evidence.timestamp),
            issued_at: format_timestamp(issued_at),
        }
    }

    /// Parse the claims back into evidence plus the issue time.
    pub fn into_parts(self) -> Result<(Evidence, DateTime<Utc>)> {
        let timestamp = parse_timestamp("timestamp", &self.timestamp)?;
        let issued_at = parse_timestamp("issued_at", &self.issued_at)?;
        let evidence = Evidence::new(self.document_id, &self.sha256, timestamp)
            .map_err(|e| SigningError::MalformedToken(e.to_string()))?;
        Ok((evidence, issued_at))
    }
}

/// The JOSE header fields checked before any key lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
}

impl TokenHeader {
    /// Decode the header of a compact JWS without verifying anything.
    pub fn peek(token: &str) -> Result<Self> {
        let mut parts = token.split('.');
        let (Some(header), Some(_), Some(_), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SigningError::MalformedToken(
                "expected three dot-separated segments".into(),
            ));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|e| SigningError::MalformedToken(format!("header encoding: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SigningError::MalformedToken(format!("header json: {e}")))
    }
}
