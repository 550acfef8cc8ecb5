//! Audit events: the structured records written to daily partitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DocumentUpload,
    DocumentDownload,
    DocumentDelete,
    DocumentVerify,
    EvidenceSigned,
    ReconciliationRun,
    OrphanDetected,
    WebhookQueued,
    WebhookDelivered,
    WebhookFailed,
    InvoiceValidated,
    KeyRotated,
    AuditLogSealed,
    AuditLogCleanup,
}

impl EventType {
    /// The wire name of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DocumentUpload => "document_upload",
            EventType::DocumentDownload => "document_download",
            EventType::DocumentDelete => "document_delete",
            EventType::DocumentVerify => "document_verify",
            EventType::EvidenceSigned => "evidence_signed",
            EventType::ReconciliationRun => "reconciliation_run",
            EventType::OrphanDetected => "orphan_detected",
            EventType::WebhookQueued => "webhook_queued",
            EventType::WebhookDelivered => "webhook_delivered",
            EventType::WebhookFailed => "webhook_failed",
            EventType::InvoiceValidated => "invoice_validated",
            EventType::KeyRotated => "key_rotated",
            EventType::AuditLogSealed => "audit_log_sealed",
            EventType::AuditLogCleanup => "audit_log_cleanup",
        }
    }
}

/// Outcome of the recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Error,
    /// The action was a replay of one already performed.
    Idempotent,
}

/// A single audit record.
///
/// `timestamp` may be left unset by producers; the logger fills it with the
/// call time before the event is buffered, so every persisted line carries
/// one. Metadata is a `BTreeMap` so the serialized line is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl AuditEvent {
    /// Create an event with no timestamp and no optional fields.
    pub fn new(event_type: EventType, status: EventStatus) -> Self {
        Self {
            timestamp: None,
            event_type,
            document_id: None,
            request_id: None,
            source: None,
            status,
            duration_ms: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Shorthand for a successful event.
    pub fn success(event_type: EventType) -> Self {
        Self::new(event_type, EventStatus::Success)
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the timestamp to `now` if the producer left it empty.
    pub fn ensure_timestamp(&mut self, now: DateTime<Utc>) {
        if self.timestamp.is_none() {
            self.timestamp = Some(now);
        }
    }

    /// Serialize to one NDJSON line (without the trailing newline).
    pub fn to_json_line(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse one NDJSON line.
    pub fn from_json_line(line: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(line)
    }
}
