//! Daily chain hash over the lines of a partition.
//!
//! The chain is defined over partition lines `L1..Ln` in file order:
//!
//! ```text
//! H1 = SHA256(L1)
//! Hi = SHA256(hex(H{i-1}) || Li)
//! ```
//!
//! `hex` is the lowercase hexadecimal *string* of the previous digest, not
//! its raw bytes. Sealed partitions depend on this exact construction, so it
//! must not change without a migration path.

use std::fmt;
use std::io::{self, BufRead};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// A 32-byte SHA-256 chain digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainHash(pub [u8; 32]);

impl ChainHash {
    /// Hash a single byte string.
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding (64 chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-char hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidHash(format!("expected 32 bytes in {s:?}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for ChainHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for ChainHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for ChainHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChainHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Streaming accumulator for the chain hash.
///
/// Holds only the running digest, so memory use is constant regardless of
/// partition size.
#[derive(Debug, Clone, Default)]
pub struct ChainHasher {
    head: Option<ChainHash>,
    line_count: u64,
}

impl ChainHasher {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the next line (without its terminator) into the chain.
    pub fn update(&mut self, line: &[u8]) {
        let mut hasher = Sha256::new();
        if let Some(prev) = &self.head {
            hasher.update(prev.to_hex().as_bytes());
        }
        hasher.update(line);
        self.head = Some(ChainHash(hasher.finalize().into()));
        self.line_count += 1;
    }

    /// Number of lines folded so far.
    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    /// Current head of the chain, `None` while no line has been seen.
    pub fn head(&self) -> Option<ChainHash> {
        self.head
    }

    /// Finish the chain.
    pub fn finish(self) -> ChainDigest {
        ChainDigest {
            hash: self.head,
            line_count: self.line_count,
        }
    }
}

/// Result of hashing a whole partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDigest {
    /// Final chain hash, `None` for a partition with no lines.
    pub hash: Option<ChainHash>,
    /// Number of lines hashed.
    pub line_count: u64,
}

/// Compute the chain over newline-delimited input.
///
/// Lines are split on `\n`; the terminator and a `\r` directly before it are
/// not part of the line. A final line without a terminator still counts, and a
/// trailing newline does not create an extra empty line.
pub fn chain_hash_reader<R: BufRead>(mut reader: R) -> io::Result<ChainDigest> {
    let mut hasher = ChainHasher::new();
    let mut buf = Vec::with_capacity(512);

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(strip_line_terminator(&buf));
    }

    Ok(hasher.finish())
}

/// Compute the chain over an in-memory sequence of lines.
pub fn chain_hash_lines<I, L>(lines: I) -> ChainDigest
where
    I: IntoIterator<Item = L>,
    L: AsRef<[u8]>,
{
    let mut hasher = ChainHasher::new();
    for line in lines {
        hasher.update(line.as_ref());
    }
    hasher.finish()
}

fn strip_line_terminator(line: &[u8]) -> &[u8] {
    match line.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        // An unterminated final line keeps any trailing `\r`.
        None => line,
    }
}
