//! Deterministic naming of partition and seal files.

use chrono::NaiveDate;

use crate::error::{CoreError, Result};

/// Date format used in file names and synthetic document ids.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const FILE_PREFIX: &str = "audit-";
const PARTITION_SUFFIX: &str = ".jsonl";
const SEAL_SUFFIX: &str = ".seal.json";

/// Render a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| CoreError::InvalidDate(format!("{s}: {e}")))
}

/// File name of the partition for `date`: `audit-YYYY-MM-DD.jsonl`.
pub fn partition_file_name(date: NaiveDate) -> String {
    format!("{FILE_PREFIX}{}{PARTITION_SUFFIX}", format_date(date))
}

/// File name of the seal for `date`: `audit-YYYY-MM-DD.seal.json`.
pub fn seal_file_name(date: NaiveDate) -> String {
    format!("{FILE_PREFIX}{}{SEAL_SUFFIX}", format_date(date))
}

/// Recover the date from a partition file name, `None` for anything else.
pub fn parse_partition_file_name(name: &str) -> Option<NaiveDate> {
    parse_between(name, PARTITION_SUFFIX)
}

/// Recover the date from a seal file name, `None` for anything else.
pub fn parse_seal_file_name(name: &str) -> Option<NaiveDate> {
    parse_between(name, SEAL_SUFFIX)
}

fn parse_between(name: &str, suffix: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(suffix)?;
    // Reject non-canonical spellings like "2025-1-5" so names stay bijective.
    let parsed = parse_date(date).ok()?;
    (format_date(parsed) == date).then_some(parsed)
}
