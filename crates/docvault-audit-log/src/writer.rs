//! Append-only partition file handle.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use crate::layout::AuditLayout;

/// A batch that could not be made durable.
#[derive(Debug, Error)]
#[error("{source} (rolled back: {rolled_back})")]
pub struct AppendError {
    pub source: io::Error,
    /// The partition holds none of the batch.
    pub rolled_back: bool,
}

impl AppendError {
    fn clean(source: io::Error) -> Self {
        Self {
            source,
            rolled_back: true,
        }
    }
}

/// The file operations a batch write needs.
pub(crate) trait BatchFile: Write {
    fn size(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl BatchFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_all()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Write, flush and sync `batch`, cutting the file back on any failure.
pub(crate) fn write_batch<F: BatchFile>(file: &mut F, batch: &[u8]) -> Result<(), AppendError> {
    let start = file.size().map_err(AppendError::clean)?;
    let written = file
        .write_all(batch)
        .and_then(|()| file.flush())
        .and_then(|()| file.sync());

    match written {
        Ok(()) => Ok(()),
        Err(source) => {
            let rolled_back = match file.truncate(start) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "could not roll back partial partition batch");
                    false
                }
            };
            Err(AppendError {
                source,
                rolled_back,
            })
        }
    }
}

/// Owns the file handle of the partition currently being written.
///
/// The handle is reopened whenever a batch targets a different date than the
/// one last written, so the date boundary is decided per flush.
#[derive(Debug)]
pub struct PartitionWriter {
    layout: Arc<AuditLayout>,
    open: Option<(NaiveDate, File)>,
}

impl PartitionWriter {
    pub fn new(layout: Arc<AuditLayout>) -> Self {
        Self { layout, open: None }
    }

    /// Date of the currently open partition, if any.
    pub fn current_date(&self) -> Option<NaiveDate> {
        self.open.as_ref().map(|(date, _)| *date)
    }

    /// Append `lines` to the partition for `date` and fsync.
    ///
    /// Each line is written followed by `\n`. The batch is written with one
    /// `write_all`, so it lands contiguously. On failure the file is cut back
    /// to its length before the batch; [`AppendError::rolled_back`] says
    /// whether that succeeded.
    pub fn append(&mut self, date: NaiveDate, lines: &[Vec<u8>]) -> Result<usize, AppendError> {
        if lines.is_empty() {
            return Ok(0);
        }

        let mut batch = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            batch.extend_from_slice(line);
            batch.push(b'\n');
        }

        let file = self.file_for(date).map_err(AppendError::clean)?;
        let result = write_batch(file, &batch);
        if result.is_err() {
            // Reopen on the next batch rather than trust this handle.
            self.open = None;
        }
        result?;

        debug!(date = %date, lines = lines.len(), bytes = batch.len(), "partition batch written");
        Ok(lines.len())
    }

    /// Drop the open handle.
    pub fn close(&mut self) {
        self.open = None;
    }

    fn file_for(&mut self, date: NaiveDate) -> io::Result<&mut File> {
        if self.current_date() != Some(date) {
            let path = self.layout.partition_path(date);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            debug!(path = %path.display(), "opened partition");
            self.open = Some((date, file));
        }
        match self.open.as_mut() {
            Some((_, file)) => Ok(file),
            None => Err(io::Error::other("partition handle missing")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_append_and_switch_dates() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Arc::new(AuditLayout::create(dir.path()).unwrap());
        let mut writer = PartitionWriter::new(layout.clone());

        writer.append(date(1), &[b"a".to_vec(), b"b".to_vec()]).unwrap();
        writer.append(date(1), &[b"c".to_vec()]).unwrap();
        assert_eq!(writer.current_date(), Some(date(1)));
        writer.append(date(2), &[b"d".to_vec()]).unwrap();
        assert_eq!(writer.current_date(), Some(date(2)));

        assert_eq!(fs::read(layout.partition_path(date(1))).unwrap(), b"a\nb\nc\n");
        assert_eq!(fs::read(layout.partition_path(date(2))).unwrap(), b"d\n");
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Arc::new(AuditLayout::create(dir.path()).unwrap());

        let mut writer = PartitionWriter::new(layout.clone());
        writer.append(date(1), &[b"a".to_vec()]).unwrap();
        writer.close();
        assert!(writer.current_date().is_none());

        let mut writer = PartitionWriter::new(layout.clone());
        writer.append(date(1), &[b"b".to_vec()]).unwrap();
        assert_eq!(fs::read(layout.partition_path(date(1))).unwrap(), b"a\nb\n");
    }

    /// In-memory file whose sync or truncate can be made to fail.
    struct FlakyFile {
        data: Vec<u8>,
        fail_sync: bool,
        fail_truncate: bool,
    }

    impl FlakyFile {
        fn new(data: &[u8]) -> Self {
            Self {
                data: data.to_vec(),
                fail_sync: false,
                fail_truncate: false,
            }
        }
    }

    impl Write for FlakyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl BatchFile for FlakyFile {
        fn size(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.fail_truncate {
                return Err(io::Error::other("truncate refused"));
            }
            self.data.truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync {
                return Err(io::Error::other("EIO"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_failed_sync_rolls_back_batch() {
        let mut file = FlakyFile::new(b"a\n");
        file.fail_sync = true;

        let err = write_batch(&mut file, b"b\nc\n").unwrap_err();
        assert!(err.rolled_back);
        assert_eq!(file.data, b"a\n");

        file.fail_sync = false;
        write_batch(&mut file, b"b\nc\n").unwrap();
        assert_eq!(file.data, b"a\nb\nc\n");
    }

    #[test]
    fn test_failed_rollback_is_reported() {
        let mut file = FlakyFile::new(b"");
        file.fail_sync = true;
        file.fail_truncate = true;

        let err = write_batch(&mut file, b"b\n").unwrap_err();
        assert!(!err.rolled_back);
        assert_eq!(err.source.to_string(), "EIO");
    }

    #[test]
    fn test_open_failure_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Arc::new(AuditLayout::create(dir.path()).unwrap());
        fs::create_dir(layout.partition_path(date(1))).unwrap();

        let mut writer = PartitionWriter::new(layout);
        let err = writer.append(date(1), &[b"a".to_vec()]).unwrap_err();
        assert!(err.rolled_back);
        assert!(writer.current_date().is_none());
    }

    #[test]
    fn test_empty_batch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Arc::new(AuditLayout::create(dir.path()).unwrap());
        let mut writer = PartitionWriter::new(layout.clone());
        assert_eq!(writer.append(date(1), &[]).unwrap(), 0);
        assert!(!layout.has_partition(date(1)));
    }
}
