//! Buffered, date-partitioned event logger.
//!
//! Events are stamped and serialized on [`EventLogger::log`] and held in
//! memory until a flush. A flush happens when the buffer reaches
//! `max_buffer`, on every `flush_interval` tick of a background task, on an
//! explicit [`EventLogger::flush`], and on [`EventLogger::close`].
//!
//! ## Design Notes
//!
//! - **Ordering**: the file lock is taken before the buffer is swapped out,
//!   so batches hit the file in the order they were taken from the buffer.
//! - **Partition choice**: a batch goes to the partition of the date at flush
//!   time, not the date in each event.
//! - **Durability**: each batch is fsync'd before `flush` returns.
//! - **Failed flush**: the partition is cut back to its length before the
//!   batch, the batch goes back to the front of the buffer and the error is
//!   returned. A batch that cannot be cut back is reported as
//!   `IndeterminateWrite` and not re-queued, so no line is written twice.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use docvault_audit_core::{format_date, AuditEvent, SharedClock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::error::{LogError, Result};
use crate::layout::AuditLayout;
use crate::writer::PartitionWriter;

/// Default number of buffered events that triggers a flush.
pub const DEFAULT_MAX_BUFFER: usize = 1000;

/// Default period of the background flush.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for [`EventLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    pub max_buffer: usize,
    pub flush_interval: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_buffer: DEFAULT_MAX_BUFFER,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl LoggerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_buffer == 0 {
            return Err(LogError::Configuration("max_buffer must be positive".into()));
        }
        if self.flush_interval.is_zero() {
            return Err(LogError::Configuration(
                "flush_interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

struct LoggerInner {
    config: LoggerConfig,
    clock: SharedClock,
    buffer: Mutex<Vec<Vec<u8>>>,
    writer: Arc<tokio::sync::Mutex<PartitionWriter>>,
    closed: AtomicBool,
}

impl LoggerInner {
    async fn flush(&self) -> Result<usize> {
        // Lock order: file first, then buffer.
        let mut writer = self.writer.clone().lock_owned().await;

        let batch = {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            mem::take(&mut *buffer)
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let date = self.clock.today();
        let (batch, result) = tokio::task::spawn_blocking(move || {
            let result = writer.append(date, &batch);
            (batch, result)
        })
        .await?;

        match result {
            Ok(written) => {
                debug!(date = %date, lines = written, "flushed audit events");
                Ok(written)
            }
            Err(e) if e.rolled_back => {
                let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
                let newer = mem::replace(&mut *buffer, batch);
                buffer.extend(newer);
                Err(e.source.into())
            }
            Err(e) => {
                error!(date = %date, lines = batch.len(), error = %e.source, "audit batch may be partially written");
                Err(LogError::IndeterminateWrite {
                    date: format_date(date),
                    lines: batch.len(),
                    source: e.source,
                })
            }
        }
    }
}

/// Append-only audit event logger.
///
/// Must be started inside a tokio runtime; it owns one background flush task.
pub struct EventLogger {
    inner: Arc<LoggerInner>,
    layout: Arc<AuditLayout>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventLogger {
    /// Create the directories and start the background flush task.
    pub fn start(layout: Arc<AuditLayout>, config: LoggerConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        layout.ensure_dirs()?;

        let inner = Arc::new(LoggerInner {
            buffer: Mutex::new(Vec::with_capacity(config.max_buffer)),
            writer: Arc::new(tokio::sync::Mutex::new(PartitionWriter::new(layout.clone()))),
            closed: AtomicBool::new(false),
            config,
            clock,
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(flush_loop(inner.clone(), shutdown_rx));

        Ok(Self {
            inner,
            layout,
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn layout(&self) -> &Arc<AuditLayout> {
        &self.layout
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.inner.config
    }

    /// Record one event.
    ///
    /// The timestamp is filled with the current time if unset. An event that
    /// fails to serialize is dropped with a warning; it is not an error for
    /// the caller. Returns `Closed` after [`close`](Self::close).
    pub async fn log(&self, mut event: AuditEvent) -> Result<()> {
        event.ensure_timestamp(self.inner.clock.now());
        let line = match event.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(event_type = event.event_type.as_str(), error = %e, "dropping unserializable audit event");
                return Ok(());
            }
        };

        let pending = {
            let mut buffer = self.inner.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            // Checked under the buffer lock so close() cannot miss this line.
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(LogError::Closed);
            }
            buffer.push(line);
            buffer.len()
        };

        if pending >= self.inner.config.max_buffer {
            self.inner.flush().await?;
        }
        Ok(())
    }

    /// Write all buffered events to today's partition. Returns the count.
    pub async fn flush(&self) -> Result<usize> {
        self.inner.flush().await
    }

    /// Number of events waiting for a flush.
    pub fn buffered_len(&self) -> usize {
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop the background task and flush what is left.
    ///
    /// Idempotent. If the final flush fails the error is returned and the
    /// events stay buffered; calling `close` again retries them.
    pub async fn close(&self) -> Result<()> {
        {
            let _buffer = self.inner.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            self.inner.closed.store(true, Ordering::SeqCst);
        }

        let _ = self.shutdown.send(true);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "audit flush task ended abnormally");
            }
        }

        self.inner.flush().await?;
        self.inner.writer.lock().await.close();
        Ok(())
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        let pending = self.buffered_len();
        if pending > 0 {
            warn!(pending, "audit logger dropped with unwritten events");
        }
    }
}

async fn flush_loop(inner: Arc<LoggerInner>, mut shutdown: watch::Receiver<bool>) {
    let period = inner.config.flush_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = inner.flush().await {
                    error!(error = %e, "periodic audit flush failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
