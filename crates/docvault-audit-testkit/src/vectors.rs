//! Golden chain vectors.
//!
//! Expected hashes were computed independently of this workspace, so they pin
//! the exact chaining rule: `H1 = SHA256(L1)`, `Hi = SHA256(hex(H(i-1)) || Li)`.

use docvault_audit_core::{chain_hash_lines, chain_hash_reader};

/// A golden chain vector.
#[derive(Debug, Clone)]
pub struct ChainVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Partition lines, without terminators.
    pub lines: &'static [&'static str],
    /// Expected final chain hash (hex).
    pub expected_hash: &'static str,
}

impl ChainVector {
    /// The partition file body for these lines.
    pub fn file_body(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for line in self.lines {
            body.extend_from_slice(line.as_bytes());
            body.push(b'\n');
        }
        body
    }
}

/// Get all golden chain vectors.
pub fn all_vectors() -> Vec<ChainVector> {
    vec![
        ChainVector {
            name: "single line",
            lines: &["a"],
            // SHA256("a")
            expected_hash: "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb",
        },
        ChainVector {
            name: "three lines",
            lines: &["a", "b", "c"],
            expected_hash: "9df5348cd43886f324a44ebcb833a21cb364505174b64d7b927803e485644a2f",
        },
        ChainVector {
            name: "empty line in the middle",
            lines: &["a", "", "b"],
            expected_hash: "709876a35d7e8ae480cb9ab8092e468dba59186635f0222c7b25cb5d87c301d0",
        },
        ChainVector {
            name: "single empty line",
            lines: &[""],
            // SHA256("")
            expected_hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        },
        ChainVector {
            name: "utf-8 content",
            lines: &["héllo wörld", "日本語"],
            expected_hash: "0a099a9ef17c979306bc7a6d4d9fc3723e621442fe597aa7198e3b64a983fbe8",
        },
        ChainVector {
            name: "ndjson events",
            lines: &[
                r#"{"timestamp":"2025-01-15T10:30:00.000Z","event_type":"document_upload","document_id":"doc-1","status":"success","metadata":{}}"#,
                r#"{"timestamp":"2025-01-15T10:31:00.000Z","event_type":"document_download","document_id":"doc-1","status":"success","metadata":{}}"#,
            ],
            expected_hash: "edf83456cf9f6aa75df0b009212a73d14220a71214305ea72ef0b386a4b63984",
        },
    ]
}

/// Hash a vector both in memory and from its file body.
///
/// Returns `(in_memory, from_file)` hex digests.
pub fn compute_vector(vector: &ChainVector) -> (String, String) {
    let in_memory = chain_hash_lines(vector.lines.iter().copied());
    let body = vector.file_body();
    let from_file = chain_hash_reader(&body[..]).map(|d| d.hash);

    let hex = |h: Option<docvault_audit_core::ChainHash>| h.map(|h| h.to_hex()).unwrap_or_default();
    (hex(in_memory.hash), from_file.map(hex).unwrap_or_default())
}

/// Check every vector. Returns the names of those that do not match.
pub fn verify_all_vectors() -> Vec<&'static str> {
    all_vectors()
        .into_iter()
        .filter(|v| {
            let (in_memory, from_file) = compute_vector(v);
            in_memory != v.expected_hash || from_file != v.expected_hash
        })
        .map(|v| v.name)
        .collect()
}
