//! Proptest generators for property-based testing.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::Value;

use docvault_audit_core::{AuditEvent, EventStatus, EventType};

/// Generate an EventType.
pub fn event_type() -> impl Strategy<Value = EventType> {
    prop_oneof![
        Just(EventType::DocumentUpload),
        Just(EventType::DocumentDownload),
        Just(EventType::DocumentDelete),
        Just(EventType::DocumentVerify),
        Just(EventType::EvidenceSigned),
        Just(EventType::ReconciliationRun),
        Just(EventType::OrphanDetected),
        Just(EventType::WebhookQueued),
        Just(EventType::WebhookDelivered),
        Just(EventType::WebhookFailed),
        Just(EventType::InvoiceValidated),
        Just(EventType::KeyRotated),
        Just(EventType::AuditLogSealed),
        Just(EventType::AuditLogCleanup),
    ]
}

/// Generate an EventStatus.
pub fn event_status() -> impl Strategy<Value = EventStatus> {
    prop_oneof![
        Just(EventStatus::Success),
        Just(EventStatus::Error),
        Just(EventStatus::Idempotent),
    ]
}

/// Generate a timestamp between 2020 and 2035, millisecond precision.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800_000i64..2_051_222_400_000i64).prop_map(|ms| {
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or_else(|| Utc.timestamp_nanos(0))
    })
}

/// Generate a document id.
pub fn document_id() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{0,35}".prop_map(String::from)
}

/// Generate a lowercase SHA-256 hex digest.
pub fn sha256_hex() -> impl Strategy<Value = String> {
    "[0-9a-f]{64}".prop_map(String::from)
}

/// Generate a metadata value, including strings that need JSON escaping.
pub fn metadata_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<u32>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        ".{0,24}".prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// Generate an event with a random subset of optional fields.
pub fn audit_event() -> impl Strategy<Value = AuditEvent> {
    (
        event_type(),
        event_status(),
        proptest::option::of(timestamp()),
        proptest::option::of(document_id()),
        proptest::option::of("[a-f0-9]{8}"),
        proptest::option::of(0u64..600_000),
        prop::collection::btree_map("[a-z_]{1,12}", metadata_value(), 0..4),
    )
        .prop_map(
            |(event_type, status, timestamp, document_id, request_id, duration_ms, metadata)| {
                AuditEvent {
                    timestamp,
                    event_type,
                    document_id,
                    request_id,
                    source: None,
                    status,
                    duration_ms,
                    metadata,
                }
            },
        )
}

/// Generate partition lines: non-empty, no line terminators.
pub fn partition_lines(max_lines: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[^\r\n]{1,64}", 1..=max_lines)
}

/// An edit an attacker might make to a sealed partition.
#[derive(Debug, Clone)]
pub enum Tamper {
    /// XOR one byte with a non-zero mask.
    FlipByte { index: usize, mask: u8 },
    /// Remove one line.
    DropLine { index: usize },
    /// Exchange two lines.
    SwapLines { a: usize, b: usize },
    /// Add a line at the end.
    AppendLine { line: String },
}

impl Tamper {
    /// Apply to a partition made of `lines`, each terminated by `\n`.
    ///
    /// Indices are taken modulo the relevant length. Returns `None` when the
    /// edit would leave the body unchanged.
    pub fn apply(&self, lines: &[String]) -> Option<Vec<u8>> {
        let original = join_lines(lines);
        let edited = match self {
            Tamper::FlipByte { index, mask } => {
                let mut body = original.clone();
                let i = index % body.len();
                body[i] ^= mask;
                body
            }
            Tamper::DropLine { index } => {
                let mut lines = lines.to_vec();
                lines.remove(index % lines.len());
                join_lines(&lines)
            }
            Tamper::SwapLines { a, b } => {
                let mut lines = lines.to_vec();
                let len = lines.len();
                lines.swap(a % len, b % len);
                join_lines(&lines)
            }
            Tamper::AppendLine { line } => {
                let mut lines = lines.to_vec();
                lines.push(line.clone());
                join_lines(&lines)
            }
        };
        (edited != original).then_some(edited)
    }
}

/// Generate a Tamper.
pub fn tamper() -> impl Strategy<Value = Tamper> {
    prop_oneof![
        (any::<usize>(), 1u8..=255).prop_map(|(index, mask)| Tamper::FlipByte { index, mask }),
        any::<usize>().prop_map(|index| Tamper::DropLine { index }),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Tamper::SwapLines { a, b }),
        "[^\r\n]{0,32}".prop_map(|line| Tamper::AppendLine { line }),
    ]
}

/// Join lines into a partition body, one `\n` after each.
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> Vec<u8> {
    let mut body = Vec::new();
    for line in lines {
        body.extend_from_slice(line.as_ref().as_bytes());
        body.push(b'\n');
    }
    body
}
