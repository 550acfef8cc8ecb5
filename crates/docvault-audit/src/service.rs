//! The AuditService: one handle over the logger, seals, evidence and keys.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use docvault_audit_core::{AuditEvent, DailyChainSeal, EventType, SharedClock, SystemClock};
use docvault_audit_keys::{JwkSet, KeyLifecycleManager, KeyManager, RotationSummary};
use docvault_audit_log::{
    AuditLayout, ChainSigner, DateVerification, EventLogger, SealVerification,
};
use docvault_audit_signing::{EvidenceSigner, JwsEvidenceSigner, VerifiedEvidence};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AuditConfig;
use crate::error::Result;
use crate::scheduler::RetentionScheduler;

const EVENT_SOURCE: &str = "audit-service";

/// A running audit core for one root directory.
///
/// Provides a unified API for:
/// - Recording audit events
/// - Signing and verifying per-document evidence
/// - Sealing and verifying daily partitions
/// - Rotating the signing key
pub struct AuditService {
    config: AuditConfig,
    layout: Arc<AuditLayout>,
    keys: Arc<KeyLifecycleManager>,
    signer: Arc<JwsEvidenceSigner>,
    logger: Arc<EventLogger>,
    chain: Arc<ChainSigner>,
    scheduler: Arc<RetentionScheduler>,
    shutdown: watch::Sender<bool>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
}

impl AuditService {
    /// Start with the key backend described by `config` and the system clock.
    pub async fn start(config: AuditConfig) -> Result<Self> {
        config.validate()?;
        let backend = config.key_manager()?;
        Self::start_with(config, backend, Arc::new(SystemClock)).await
    }

    /// Start with an explicit key backend and clock.
    ///
    /// `config.keys.backend` is ignored.
    pub async fn start_with(
        config: AuditConfig,
        backend: Arc<dyn KeyManager>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate_settings()?;

        let layout = Arc::new(AuditLayout::create(config.root_dir.clone())?);
        let keys = Arc::new(
            KeyLifecycleManager::initialize(backend, config.lifecycle_config(), clock.clone())
                .await?,
        );
        let signer = Arc::new(JwsEvidenceSigner::new(keys.clone(), clock.clone()));
        let logger = Arc::new(EventLogger::start(
            layout.clone(),
            config.logger_config(),
            clock.clone(),
        )?);
        let chain = Arc::new(ChainSigner::new(
            layout.clone(),
            signer.clone(),
            clock.clone(),
        ));
        let scheduler = Arc::new(RetentionScheduler::new(
            logger.clone(),
            chain.clone(),
            keys.clone(),
            clock,
            config.retention_days,
            config.tick_interval(),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let scheduler_task = config
            .scheduler
            .enabled
            .then(|| scheduler.clone().spawn(shutdown_rx));

        info!(
            root = %layout.root().display(),
            kid = %keys.current_kid(),
            backend = keys.backend().backend_name(),
            scheduler = config.scheduler.enabled,
            "audit service started"
        );

        Ok(Self {
            config,
            layout,
            keys,
            signer,
            logger,
            chain,
            scheduler,
            shutdown,
            scheduler_task: Mutex::new(scheduler_task),
        })
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn layout(&self) -> &Arc<AuditLayout> {
        &self.layout
    }

    pub fn logger(&self) -> &Arc<EventLogger> {
        &self.logger
    }

    pub fn keys(&self) -> &Arc<KeyLifecycleManager> {
        &self.keys
    }

    pub fn signer(&self) -> Arc<dyn EvidenceSigner> {
        self.signer.clone()
    }

    pub fn chain(&self) -> &Arc<ChainSigner> {
        &self.chain
    }

    pub fn scheduler(&self) -> &Arc<RetentionScheduler> {
        &self.scheduler
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Record an audit event.
    pub async fn log(&self, event: AuditEvent) -> Result<()> {
        Ok(self.logger.log(event).await?)
    }

    /// Write buffered events now.
    pub async fn flush(&self) -> Result<usize> {
        Ok(self.logger.flush().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Evidence
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign evidence for a document and record that it was issued.
    pub async fn sign_evidence(
        &self,
        document_id: &str,
        sha256_hex: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<String> {
        let token = self.signer.sign(document_id, sha256_hex, timestamp)?;
        self.logger
            .log(
                AuditEvent::success(EventType::EvidenceSigned)
                    .with_document(document_id)
                    .with_source(EVENT_SOURCE)
                    .with_metadata("sha256", sha256_hex.to_ascii_lowercase())
                    .with_metadata("kid", self.keys.current_kid()),
            )
            .await?;
        Ok(token)
    }

    pub fn verify_evidence(&self, token: &str) -> Result<VerifiedEvidence> {
        Ok(self.signer.verify_evidence(token)?)
    }

    /// JWKS of the keys that currently verify.
    pub fn jwks(&self) -> JwkSet {
        self.signer.current_jwks()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Seals
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn seal(&self, date: NaiveDate) -> Result<DailyChainSeal> {
        Ok(self.chain.sign_daily_log(date).await?)
    }

    pub async fn verify_seal(&self, date: NaiveDate) -> Result<SealVerification> {
        Ok(self.chain.verify_daily_log(date).await?)
    }

    pub async fn verify_all_seals(&self) -> Result<Vec<DateVerification>> {
        Ok(self.chain.verify_all().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Switch signing to `new_kid` and record the rotation.
    pub async fn rotate_key(&self, new_kid: &str) -> Result<RotationSummary> {
        let summary = self.keys.rotate(new_kid).await?;
        self.logger
            .log(
                AuditEvent::success(EventType::KeyRotated)
                    .with_source(EVENT_SOURCE)
                    .with_metadata("previous_kid", summary.previous_kid.clone())
                    .with_metadata("current_kid", summary.current_kid.clone())
                    .with_metadata(
                        "previous_valid_until",
                        summary.previous_valid_until.to_rfc3339(),
                    ),
            )
            .await?;
        Ok(summary)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Stop the scheduler and close the logger. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        let task = self
            .scheduler_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "audit scheduler ended abnormally");
            }
        }

        self.logger.close().await?;
        info!(root = %self.layout.root().display(), "audit service stopped");
        Ok(())
    }
}
