//! # Docvault Audit
//!
//! The audit core of a document vault: every recorded action is provable
//! after the fact.
//!
//! ## Overview
//!
//! - **Event log**: append-only, one NDJSON partition per UTC day
//! - **Daily seals**: each closed partition is hash-chained and the final hash
//!   signed
//! - **Evidence**: RS256 JWS binding a document id, its SHA-256 and a time
//! - **Key lifecycle**: the signing key rotates while tokens signed by the
//!   previous key keep verifying through a grace window
//! - **Retention**: a scheduler seals every closed unsealed partition, flushes
//!   today and deletes partitions past the retention window
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docvault_audit::{AuditConfig, AuditService};
//! use docvault_audit::core::{AuditEvent, EventType};
//!
//! async fn example() -> docvault_audit::Result<()> {
//!     // AUDIT_SIGNING_KID, AUDIT_SIGNING_KEY_PATH, ...
//!     let config = AuditConfig::from_env()?;
//!     let service = AuditService::start(config).await?;
//!
//!     service
//!         .log(AuditEvent::success(EventType::DocumentUpload).with_document("doc-1"))
//!         .await?;
//!
//!     let digest = "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb";
//!     let token = service
//!         .sign_evidence("doc-1", digest, chrono::Utc::now())
//!         .await?;
//!     let verified = service.verify_evidence(&token)?;
//!     assert_eq!(verified.evidence.document_id, "doc-1");
//!
//!     service.shutdown().await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `docvault_audit::core` - data model, chain hash, clock
//! - `docvault_audit::keys` - key backends and lifecycle
//! - `docvault_audit::signing` - evidence tokens
//! - `docvault_audit::log` - event logger and daily seals

pub mod config;
pub mod error;
pub mod scheduler;
pub mod service;

// Re-export component crates
pub use docvault_audit_core as core;
pub use docvault_audit_keys as keys;
pub use docvault_audit_log as log;
pub use docvault_audit_signing as signing;

pub use config::{
    AuditConfig, KeyBackendConfig, KeySettings, LoggerSettings, SchedulerSettings,
    DEFAULT_RETENTION_DAYS, DEFAULT_TICK_SECS,
};
pub use error::{AuditError, Result};
pub use scheduler::{
    CleanupFailure, CleanupReport, DailyCycleReport, RetentionScheduler, RetentionStats,
    PartitionSeal, RotationReport, SealOutcome,
};
pub use service::AuditService;

// Re-export commonly used types
pub use docvault_audit_core::{AuditEvent, DailyChainSeal, EventStatus, EventType, Evidence};
pub use docvault_audit_keys::{JwkSet, KeyManager};
pub use docvault_audit_log::{DateVerification, SealVerification};
pub use docvault_audit_signing::{EvidenceSigner, VerifiedEvidence};
