//! # docvault audit signing
//!
//! Evidence signing for the docvault audit subsystem.
//!
//! An evidence token is an RS256 compact JWS whose payload binds a document
//! id, its SHA-256 digest and a timestamp. Tokens are signed with the current
//! key of a [`KeyLifecycleManager`](docvault_audit_keys::KeyLifecycleManager)
//! and verify against its trust set, so tokens issued just before a rotation
//! keep verifying through the grace window.
//!
//! ## Key Types
//!
//! - [`EvidenceSigner`] - Sign/verify interface
//! - [`JwsEvidenceSigner`] - RS256 implementation
//! - [`VerifiedEvidence`] - What a successful verification yields
//!
//! ## Token Format
//!
//! ```text
//! header  {"alg":"RS256","kid":"<kid>","typ":"JWT"}
//! payload {"document_id","sha256","timestamp","issued_at"}
//! ```
//!
//! Timestamps are RFC 3339 UTC with millisecond precision. Only RS256 is
//! accepted on verification; `none` and HMAC headers are refused before any
//! key lookup.

pub mod claims;
pub mod error;
pub mod signer;

pub use claims::{format_timestamp, EvidenceClaims, TokenHeader};
pub use error::{Result, SigningError};
pub use signer::{EvidenceSigner, JwsEvidenceSigner, VerifiedEvidence};
