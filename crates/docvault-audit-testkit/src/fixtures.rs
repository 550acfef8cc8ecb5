//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use docvault_audit::{AuditConfig, AuditService, Result};
use docvault_audit_core::{AuditEvent, Clock, EventType, ManualClock};
use docvault_audit_keys::test_util::test_key;
use docvault_audit_keys::MemoryKeyManager;

/// SHA-256 of `"a"`, a valid evidence digest.
pub const DIGEST: &str = "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb";

/// Kids loaded into every fixture backend, backed by `test_key(0..3)`.
pub const KIDS: [&str; 3] = ["k1", "k2", "k3"];

/// Fixture start time: 2025-01-15T09:00:00Z.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// A memory key backend holding [`KIDS`].
pub fn memory_backend() -> Arc<MemoryKeyManager> {
    let backend = Arc::new(MemoryKeyManager::new());
    for (i, kid) in KIDS.iter().enumerate() {
        backend.insert(*kid, test_key(i).clone());
    }
    backend
}

/// Config rooted at `root`, signing with `k1`, scheduler off.
pub fn test_config(root: &Path) -> AuditConfig {
    let mut config = AuditConfig {
        root_dir: root.to_path_buf(),
        ..AuditConfig::default()
    };
    config.keys.current_kid = KIDS[0].to_string();
    config.scheduler.enabled = false;
    config
}

/// A running [`AuditService`] over a temp directory and a manual clock.
pub struct TestAudit {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemoryKeyManager>,
    pub service: AuditService,
}

impl TestAudit {
    /// Start with the default test config.
    pub async fn new() -> Result<Self> {
        Self::with_config(|_| {}).await
    }

    /// Start after letting `adjust` edit the test config.
    pub async fn with_config(adjust: impl FnOnce(&mut AuditConfig)) -> Result<Self> {
        let dir = tempfile::tempdir().map_err(docvault_audit_log::LogError::from)?;
        let clock = Arc::new(ManualClock::new(start_time()));
        let backend = memory_backend();

        let mut config = test_config(dir.path());
        adjust(&mut config);
        let service = AuditService::start_with(config, backend.clone(), clock.clone()).await?;

        Ok(Self {
            dir,
            clock,
            backend,
            service,
        })
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Move the clock to 00:01 UTC of the next day.
    pub fn next_day(&self) -> NaiveDate {
        let next = self.today() + Duration::days(1);
        let midnight = next
            .and_hms_opt(0, 1, 0)
            .map(|t| t.and_utc())
            .unwrap_or_else(|| self.clock.now() + Duration::days(1));
        self.clock.set(midnight);
        next
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Log `n` uploads for documents `doc-0..doc-n`.
    pub async fn log_uploads(&self, n: usize) -> Result<()> {
        for i in 0..n {
            self.service
                .log(
                    AuditEvent::success(EventType::DocumentUpload)
                        .with_document(format!("doc-{i}"))
                        .with_metadata("n", i as u64),
                )
                .await?;
        }
        Ok(())
    }

    /// Raw bytes of the partition for `date`.
    pub fn partition_bytes(&self, date: NaiveDate) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.service.layout().partition_path(date))
    }

    /// Overwrite the partition for `date`.
    pub fn write_partition(&self, date: NaiveDate, body: &[u8]) -> std::io::Result<()> {
        std::fs::write(self.service.layout().partition_path(date), body)
    }
}
