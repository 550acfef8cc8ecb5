//! On-disk layout of an audit root.
//!
//! ```text
//! <root>/logs/audit-YYYY-MM-DD.jsonl
//! <root>/signatures/audit-YYYY-MM-DD.seal.json
//! ```
//!
//! All methods here are blocking; async callers run them on the blocking pool.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use docvault_audit_core::{
    chain_hash_reader, format_date, parse_partition_file_name, parse_seal_file_name,
    partition_file_name, seal_file_name, AuditEvent, ChainDigest, DailyChainSeal,
};
use tracing::warn;

use crate::error::{LogError, Result};

/// Directory under the root holding partitions.
pub const LOGS_DIR: &str = "logs";

/// Directory under the root holding seal records.
pub const SIGNATURES_DIR: &str = "signatures";

/// Paths of one audit root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLayout {
    root: PathBuf,
    logs_dir: PathBuf,
    signatures_dir: PathBuf,
}

impl AuditLayout {
    /// Describe the layout under `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            logs_dir: root.join(LOGS_DIR),
            signatures_dir: root.join(SIGNATURES_DIR),
            root,
        }
    }

    /// Describe the layout and create both directories.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = Self::new(root);
        layout.ensure_dirs()?;
        Ok(layout)
    }

    /// Create the logs and signatures directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.logs_dir, &self.signatures_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                LogError::Configuration(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn signatures_dir(&self) -> &Path {
        &self.signatures_dir
    }

    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.logs_dir.join(partition_file_name(date))
    }

    pub fn seal_path(&self, date: NaiveDate) -> PathBuf {
        self.signatures_dir.join(seal_file_name(date))
    }

    pub fn has_partition(&self, date: NaiveDate) -> bool {
        self.partition_path(date).is_file()
    }

    /// Dates with a partition file, oldest first.
    pub fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        list_named(&self.logs_dir, parse_partition_file_name)
    }

    /// Dates with a seal record, oldest first.
    pub fn list_sealed_dates(&self) -> Result<Vec<NaiveDate>> {
        list_named(&self.signatures_dir, parse_seal_file_name)
    }

    /// Chain digest of the partition for `date`.
    pub fn chain_digest(&self, date: NaiveDate) -> Result<ChainDigest> {
        let file = open_existing(&self.partition_path(date), || {
            format!("no partition for {}", format_date(date))
        })?;
        Ok(chain_hash_reader(BufReader::new(file))?)
    }

    /// All events of the partition for `date`, in file order.
    ///
    /// Blank lines are skipped. A line that does not parse is an error: the
    /// partition is supposed to hold only logger output.
    pub fn read_events(&self, date: NaiveDate) -> Result<Vec<AuditEvent>> {
        let file = open_existing(&self.partition_path(date), || {
            format!("no partition for {}", format_date(date))
        })?;

        let mut events = Vec::new();
        for line in BufReader::new(file).split(b'\n') {
            let line = line?;
            let line = line.strip_suffix(b"\r").unwrap_or(&line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            events.push(AuditEvent::from_json_line(line)?);
        }
        Ok(events)
    }

    /// The seal record for `date`.
    pub fn read_seal(&self, date: NaiveDate) -> Result<DailyChainSeal> {
        let file = open_existing(&self.seal_path(date), || {
            format!("no seal for {}", format_date(date))
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Persist `seal`, replacing any earlier record for the same date.
    ///
    /// Written to a temporary file, synced, then renamed over the target, so a
    /// reader never sees a partial record.
    pub fn write_seal(&self, seal: &DailyChainSeal) -> Result<PathBuf> {
        let target = self.seal_path(seal.date);
        let tmp = target.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(seal)?;
        if let Err(e) = write_atomic(&tmp, &target, &bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        sync_dir(&self.signatures_dir);
        Ok(target)
    }

    /// Delete the partition for `date`. Returns whether a file was removed.
    pub fn remove_partition(&self, date: NaiveDate) -> Result<bool> {
        remove_if_exists(&self.partition_path(date))
    }

    /// Delete the seal for `date`. Returns whether a file was removed.
    pub fn remove_seal(&self, date: NaiveDate) -> Result<bool> {
        remove_if_exists(&self.seal_path(date))
    }
}

fn open_existing(path: &Path, missing: impl FnOnce() -> String) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            LogError::NotFound(missing())
        } else {
            LogError::Io(e)
        }
    })
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn list_named(dir: &Path, parse: fn(&str) -> Option<NaiveDate>) -> Result<Vec<NaiveDate>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dates = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(date) = entry.file_name().to_str().and_then(parse) {
            dates.push(date);
        }
    }
    dates.sort_unstable();
    Ok(dates)
}

fn write_atomic(tmp: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    fs::rename(tmp, target)
}

// Persists the rename itself. Failure only weakens durability of the entry.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!(dir = %dir.display(), error = %e, "directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
