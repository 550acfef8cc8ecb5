//! Evidence payloads and daily chain seals.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::ChainHash;
use crate::error::{CoreError, Result};
use crate::partition::format_date;

/// Prefix of the synthetic document id used when sealing a partition.
pub const PARTITION_DOCUMENT_PREFIX: &str = "audit-log-";

/// The canonical three-field payload bound by an evidence signature.
///
/// Never persisted on its own; it only travels inside a signed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub document_id: String,
    /// Lowercase hex SHA-256 of the document content.
    pub sha256: String,
    pub timestamp: DateTime<Utc>,
}

impl Evidence {
    /// Build evidence, validating the document id and digest.
    ///
    /// The digest is normalized to lowercase.
    pub fn new(
        document_id: impl Into<String>,
        sha256: impl AsRef<str>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let document_id = document_id.into();
        if document_id.trim().is_empty() {
            return Err(CoreError::InvalidEvidence("document_id is empty".into()));
        }

        let sha256 = sha256.as_ref().to_ascii_lowercase();
        if sha256.len() != 64 || !sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidEvidence(format!(
                "sha256 must be 64 hex characters, got {:?}",
                sha256
            )));
        }

        Ok(Self {
            document_id,
            sha256,
            timestamp,
        })
    }

    /// Evidence certifying the chain hash of one partition.
    pub fn for_partition(date: NaiveDate, hash: &ChainHash, timestamp: DateTime<Utc>) -> Self {
        Self {
            document_id: partition_document_id(date),
            sha256: hash.to_hex(),
            timestamp,
        }
    }

    /// Field equality with a tolerance on the timestamp.
    ///
    /// Token timestamps are rendered with millisecond precision, so a
    /// round-tripped value is compared with sub-second tolerance.
    pub fn matches(&self, other: &Evidence, tolerance: Duration) -> bool {
        let drift = self.timestamp - other.timestamp;
        self.document_id == other.document_id
            && self.sha256 == other.sha256
            && drift <= tolerance
            && -drift <= tolerance
    }
}

/// Synthetic document id for a partition: `audit-log-YYYY-MM-DD`.
pub fn partition_document_id(date: NaiveDate) -> String {
    format!("{}{}", PARTITION_DOCUMENT_PREFIX, format_date(date))
}

/// The signed record certifying one partition's chain hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyChainSeal {
    pub date: NaiveDate,
    pub hash: ChainHash,
    /// Compact JWS over the partition evidence.
    pub jws: String,
    pub line_count: u64,
    pub sealed_at: DateTime<Utc>,
}
