//! # Docvault Audit Log
//!
//! Buffered, date-partitioned audit event log with daily chain seals.
//!
//! ## Overview
//!
//! Events are serialized to one JSON object per line and appended to
//! `logs/audit-YYYY-MM-DD.jsonl` under the audit root. Each closed partition
//! can be sealed: its lines are folded into a hash chain and the final hash is
//! signed as evidence, stored next to it in `signatures/`.
//!
//! ## Key Properties
//!
//! - **Durable**: every flush ends with an fsync of the partition
//! - **Ordered**: lines land in the order they were logged
//! - **Tamper-evident**: changing, dropping, reordering or appending a line
//!   after sealing breaks verification
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use docvault_audit_core::{AuditEvent, EventType, SystemClock};
//! use docvault_audit_log::{AuditLayout, EventLogger, LoggerConfig};
//!
//! async fn example() -> docvault_audit_log::Result<()> {
//!     let layout = Arc::new(AuditLayout::create("/var/lib/docvault/audit")?);
//!     let logger = EventLogger::start(layout, LoggerConfig::default(), Arc::new(SystemClock))?;
//!
//!     logger
//!         .log(AuditEvent::success(EventType::DocumentUpload).with_document("doc-1"))
//!         .await?;
//!     logger.close().await
//! }
//! ```

pub mod error;
pub mod layout;
pub mod logger;
pub mod seal;
pub mod writer;

pub use error::{LogError, Result};
pub use layout::{AuditLayout, LOGS_DIR, SIGNATURES_DIR};
pub use logger::{EventLogger, LoggerConfig, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BUFFER};
pub use seal::{ChainSigner, DateVerification, SealVerification};
pub use writer::{AppendError, PartitionWriter};
