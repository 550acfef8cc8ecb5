//! # Docvault Audit Testkit
//!
//! Testing utilities for docvault audit.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: known chain hashes that pin the chaining rule
//! - **Generators**: proptest strategies for events, partitions and tampering
//! - **Fixtures**: a running service over a temp directory, a manual clock and
//!   deterministic RSA keys
//!
//! ## Golden Vectors
//!
//! ```rust
//! use docvault_audit_testkit::vectors::verify_all_vectors;
//!
//! assert!(verify_all_vectors().is_empty());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use docvault_audit_testkit::generators::{partition_lines, tamper, join_lines};
//!
//! proptest! {
//!     #[test]
//!     fn tamper_is_detected(lines in partition_lines(20), edit in tamper()) {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use docvault_audit_testkit::fixtures::TestAudit;
//!
//! # async fn example() -> docvault_audit::Result<()> {
//! let audit = TestAudit::new().await?;
//! audit.log_uploads(10).await?;
//! audit.service.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use docvault_audit_keys::test_util::{test_key, test_key_pem, weak_key, TEST_KEY_COUNT};
pub use fixtures::{memory_backend, start_time, test_config, TestAudit, DIGEST, KIDS};
pub use generators::{audit_event, join_lines, partition_lines, tamper, Tamper};
pub use vectors::{all_vectors, compute_vector, verify_all_vectors, ChainVector};
