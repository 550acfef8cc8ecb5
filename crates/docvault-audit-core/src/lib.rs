//! # docvault audit core
//!
//! Pure primitives for the docvault audit subsystem: audit events, the daily
//! chain hash, evidence payloads, seal records, and partition naming.
//!
//! This crate performs no I/O beyond hashing a caller-supplied reader. Files,
//! keys and signatures live in the sibling crates.
//!
//! ## Key Types
//!
//! - [`AuditEvent`] - One structured record in a daily partition
//! - [`ChainHasher`] - Streaming hash chain over partition lines
//! - [`Evidence`] - The `{document_id, sha256, timestamp}` payload bound by a signature
//! - [`DailyChainSeal`] - The signed record certifying a partition
//! - [`Clock`] - Injectable time source

pub mod chain;
pub mod clock;
pub mod error;
pub mod event;
pub mod evidence;
pub mod partition;

pub use chain::{chain_hash_lines, chain_hash_reader, ChainDigest, ChainHash, ChainHasher};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{CoreError, Result};
pub use event::{AuditEvent, EventStatus, EventType};
pub use evidence::{partition_document_id, DailyChainSeal, Evidence, PARTITION_DOCUMENT_PREFIX};
pub use partition::{
    format_date, parse_date, parse_partition_file_name, parse_seal_file_name,
    partition_file_name, seal_file_name, DATE_FORMAT,
};
