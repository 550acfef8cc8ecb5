//! Daily chain seals: sign a closed partition's chain hash, verify it later.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use docvault_audit_core::{
    format_date, partition_document_id, ChainDigest, ChainHash, DailyChainSeal, Evidence,
    SharedClock,
};
use docvault_audit_signing::EvidenceSigner;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{LogError, Result};
use crate::layout::AuditLayout;

/// Report of a seal that verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealVerification {
    pub date: NaiveDate,
    pub hash: ChainHash,
    pub line_count: u64,
    /// Key that signed the seal.
    pub kid: String,
    pub sealed_at: DateTime<Utc>,
}

/// Outcome for one date in [`ChainSigner::verify_all`].
#[derive(Debug)]
pub struct DateVerification {
    pub date: NaiveDate,
    pub outcome: Result<SealVerification>,
}

impl DateVerification {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Seals and verifies partitions under one [`AuditLayout`].
pub struct ChainSigner {
    layout: Arc<AuditLayout>,
    signer: Arc<dyn EvidenceSigner>,
    clock: SharedClock,
}

impl ChainSigner {
    pub fn new(layout: Arc<AuditLayout>, signer: Arc<dyn EvidenceSigner>, clock: SharedClock) -> Self {
        Self {
            layout,
            signer,
            clock,
        }
    }

    pub fn layout(&self) -> &Arc<AuditLayout> {
        &self.layout
    }

    /// Chain digest of the partition for `date`, read on the blocking pool.
    pub async fn compute_partition_chain(&self, date: NaiveDate) -> Result<ChainDigest> {
        let layout = self.layout.clone();
        tokio::task::spawn_blocking(move || layout.chain_digest(date)).await?
    }

    /// Hash, sign and persist the seal for `date`.
    ///
    /// `NotFound` if there is no partition, `Empty` if it has no lines.
    /// Sealing again overwrites the previous record.
    pub async fn sign_daily_log(&self, date: NaiveDate) -> Result<DailyChainSeal> {
        let digest = self.compute_partition_chain(date).await?;
        let hash = match digest.hash {
            Some(hash) if digest.line_count > 0 => hash,
            _ => return Err(LogError::Empty(format_date(date))),
        };

        let now = self.clock.now();
        let evidence = Evidence::for_partition(date, &hash, now);
        let jws = self.signer.sign_evidence(&evidence)?;

        let seal = DailyChainSeal {
            date,
            hash,
            jws,
            line_count: digest.line_count,
            sealed_at: now,
        };

        let layout = self.layout.clone();
        let record = seal.clone();
        let path = tokio::task::spawn_blocking(move || layout.write_seal(&record)).await??;

        info!(
            date = %date,
            hash = %hash,
            lines = digest.line_count,
            path = %path.display(),
            "audit partition sealed"
        );
        Ok(seal)
    }

    /// Check the partition for `date` against its seal.
    ///
    /// Succeeds only when the recomputed hash, the sealed hash and the hash
    /// inside the signed token all agree.
    pub async fn verify_daily_log(&self, date: NaiveDate) -> Result<SealVerification> {
        let layout = self.layout.clone();
        let seal = tokio::task::spawn_blocking(move || layout.read_seal(date)).await??;
        let digest = self.compute_partition_chain(date).await?;

        let actual = digest.hash.map(|h| h.to_hex()).unwrap_or_default();
        if digest.hash != Some(seal.hash) {
            warn!(date = %date, expected = %seal.hash, actual = %actual, "audit partition altered");
            return Err(LogError::IntegrityMismatch {
                date: format_date(date),
                expected: seal.hash.to_hex(),
                actual,
            });
        }

        let verified = self.signer.verify_evidence(&seal.jws)?;
        if verified.evidence.sha256 != seal.hash.to_hex() {
            return Err(LogError::InvalidSignature(format!(
                "signed hash {} differs from sealed hash {}",
                verified.evidence.sha256, seal.hash
            )));
        }
        if verified.evidence.document_id != partition_document_id(date) {
            return Err(LogError::InvalidSignature(format!(
                "seal for {} signs {}",
                format_date(date),
                verified.evidence.document_id
            )));
        }

        Ok(SealVerification {
            date,
            hash: seal.hash,
            line_count: digest.line_count,
            kid: verified.kid,
            sealed_at: seal.sealed_at,
        })
    }

    /// Verify every sealed date, oldest first, without stopping at failures.
    pub async fn verify_all(&self) -> Result<Vec<DateVerification>> {
        let layout = self.layout.clone();
        let dates = tokio::task::spawn_blocking(move || layout.list_sealed_dates()).await??;

        let mut results = Vec::with_capacity(dates.len());
        for date in dates {
            let outcome = self.verify_daily_log(date).await;
            if let Err(e) = &outcome {
                warn!(date = %date, error = %e, "seal verification failed");
            }
            results.push(DateVerification { date, outcome });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use chrono::TimeZone;
    use docvault_audit_core::{chain_hash_lines, Clock, ManualClock};
    use docvault_audit_keys::test_util::test_key;
    use docvault_audit_keys::{KeyLifecycleManager, LifecycleConfig, MemoryKeyManager};
    use docvault_audit_signing::JwsEvidenceSigner;

    fn jan(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        layout: Arc<AuditLayout>,
        keys: Arc<KeyLifecycleManager>,
        clock: Arc<ManualClock>,
        chain: ChainSigner,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = Arc::new(AuditLayout::create(dir.path()).unwrap());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 16, 0, 5, 0).unwrap(),
        ));
        let backend = Arc::new(MemoryKeyManager::new());
        backend.insert("k1", test_key(0).clone());
        backend.insert("k2", test_key(1).clone());
        let keys = Arc::new(
            KeyLifecycleManager::initialize(backend, LifecycleConfig::new("k1"), clock.clone())
                .await
                .unwrap(),
        );
        let signer = Arc::new(JwsEvidenceSigner::new(keys.clone(), clock.clone()));
        let chain = ChainSigner::new(layout.clone(), signer, clock.clone());
        Fixture {
            _dir: dir,
            layout,
            keys,
            clock,
            chain,
        }
    }

    fn write_partition(layout: &AuditLayout, date: NaiveDate, body: &[u8]) {
        fs::write(layout.partition_path(date), body).unwrap();
    }

    #[tokio::test]
    async fn test_sign_and_verify() {
        let f = fixture().await;
        write_partition(&f.layout, jan(15), b"a\nb\nc\n");

        let seal = f.chain.sign_daily_log(jan(15)).await.unwrap();
        assert_eq!(seal.line_count, 3);
        assert_eq!(seal.hash, chain_hash_lines(["a", "b", "c"]).hash.unwrap());
        assert_eq!(seal.sealed_at, f.clock.now());
        assert_eq!(f.layout.read_seal(jan(15)).unwrap(), seal);

        let report = f.chain.verify_daily_log(jan(15)).await.unwrap();
        assert_eq!(report.hash, seal.hash);
        assert_eq!(report.line_count, 3);
        assert_eq!(report.kid, "k1");
    }

    #[tokio::test]
    async fn test_sign_missing_and_empty() {
        let f = fixture().await;
        assert!(matches!(
            f.chain.sign_daily_log(jan(15)).await,
            Err(LogError::NotFound(_))
        ));

        write_partition(&f.layout, jan(15), b"");
        assert!(matches!(
            f.chain.sign_daily_log(jan(15)).await,
            Err(LogError::Empty(_))
        ));
        assert!(!f.layout.seal_path(jan(15)).exists());
    }

    #[tokio::test]
    async fn test_verify_missing_seal_or_partition() {
        let f = fixture().await;
        write_partition(&f.layout, jan(15), b"a\n");
        assert!(matches!(
            f.chain.verify_daily_log(jan(15)).await,
            Err(LogError::NotFound(_))
        ));

        f.chain.sign_daily_log(jan(15)).await.unwrap();
        f.layout.remove_partition(jan(15)).unwrap();
        assert!(matches!(
            f.chain.verify_daily_log(jan(15)).await,
            Err(LogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_partition_is_mismatch() {
        let f = fixture().await;
        write_partition(&f.layout, jan(15), b"a\nb\nc\n");
        let seal = f.chain.sign_daily_log(jan(15)).await.unwrap();

        write_partition(&f.layout, jan(15), b"a\nB\nc\n");
        match f.chain.verify_daily_log(jan(15)).await {
            Err(LogError::IntegrityMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, seal.hash.to_hex());
                assert_ne!(actual, expected);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_appended_line_is_mismatch() {
        let f = fixture().await;
        write_partition(&f.layout, jan(15), b"a\n");
        f.chain.sign_daily_log(jan(15)).await.unwrap();

        let mut body = fs::read(f.layout.partition_path(jan(15))).unwrap();
        body.extend_from_slice(b"b\n");
        write_partition(&f.layout, jan(15), &body);
        assert!(matches!(
            f.chain.verify_daily_log(jan(15)).await,
            Err(LogError::IntegrityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_seal_hash_swapped_is_invalid_signature() {
        let f = fixture().await;
        write_partition(&f.layout, jan(15), b"a\n");
        write_partition(&f.layout, jan(14), b"x\n");
        let seal_15 = f.chain.sign_daily_log(jan(15)).await.unwrap();
        let seal_14 = f.chain.sign_daily_log(jan(14)).await.unwrap();

        // Rewrite both the partition and the stored hash; the token still
        // carries the original hash.
        write_partition(&f.layout, jan(15), b"forged\n");
        let mut forged = seal_15.clone();
        forged.hash = chain_hash_lines(["forged"]).hash.unwrap();
        f.layout.write_seal(&forged).unwrap();
        assert!(matches!(
            f.chain.verify_daily_log(jan(15)).await,
            Err(LogError::InvalidSignature(_))
        ));

        // A token lifted from another day's seal.
        let mut lifted = seal_14.clone();
        lifted.date = jan(13);
        write_partition(&f.layout, jan(13), b"x\n");
        f.layout.write_seal(&lifted).unwrap();
        assert!(matches!(
            f.chain.verify_daily_log(jan(13)).await,
            Err(LogError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_garbled_jws_is_invalid_signature() {
        let f = fixture().await;
        write_partition(&f.layout, jan(15), b"a\n");
        let mut seal = f.chain.sign_daily_log(jan(15)).await.unwrap();
        seal.jws = "not-a-token".into();
        f.layout.write_seal(&seal).unwrap();
        assert!(matches!(
            f.chain.verify_daily_log(jan(15)).await,
            Err(LogError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_reseal_same_hash() {
        let f = fixture().await;
        write_partition(&f.layout, jan(15), b"a\nb\n");
        let first = f.chain.sign_daily_log(jan(15)).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(5));
        let second = f.chain.sign_daily_log(jan(15)).await.unwrap();

        assert_eq!(first.hash, second.hash);
        assert!(second.sealed_at > first.sealed_at);
        assert_eq!(f.layout.read_seal(jan(15)).unwrap(), second);
    }

    #[tokio::test]
    async fn test_seal_survives_rotation_until_grace_ends() {
        let f = fixture().await;
        write_partition(&f.layout, jan(15), b"a\n");
        f.chain.sign_daily_log(jan(15)).await.unwrap();

        f.keys.rotate("k2").await.unwrap();
        assert_eq!(f.chain.verify_daily_log(jan(15)).await.unwrap().kid, "k1");

        f.clock.advance(chrono::Duration::days(31));
        assert!(matches!(
            f.chain.verify_daily_log(jan(15)).await,
            Err(LogError::KeyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_all_reports_each_date() {
        let f = fixture().await;
        for d in [13, 14, 15] {
            write_partition(&f.layout, jan(d), format!("day {d}\n").as_bytes());
            f.chain.sign_daily_log(jan(d)).await.unwrap();
        }
        write_partition(&f.layout, jan(14), b"tampered\n");
        // Unsealed partitions are not part of the sweep.
        write_partition(&f.layout, jan(16), b"open\n");

        let results = f.chain.verify_all().await.unwrap();
        let summary: Vec<(NaiveDate, bool)> = results.iter().map(|r| (r.date, r.is_ok())).collect();
        assert_eq!(
            summary,
            vec![(jan(13), true), (jan(14), false), (jan(15), true)]
        );
        assert!(matches!(
            results[1].outcome,
            Err(LogError::IntegrityMismatch { .. })
        ));
    }
}
