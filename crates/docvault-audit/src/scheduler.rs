//! Daily rotation and retention.
//!
//! Once per UTC day the scheduler seals yesterday's partition and any earlier
//! one still unsealed, flushes today's, deletes partitions and seals past the
//! retention window and warns when the signing key is due for rotation.
//!
//! ## Design Notes
//!
//! - **Best effort**: a failed seal or a failed deletion is logged and
//!   reported; it never stops the rest of the cycle.
//! - **Catch-up**: every closed partition inside the retention window without
//!   a seal is sealed on the next run, so a failed seal is retried.
//! - **Once per day**: the background task wakes every tick but only runs
//!   the cycle when the last complete run was on an earlier date.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use docvault_audit_core::{
    format_date, AuditEvent, ChainHash, EventStatus, EventType, SharedClock,
};
use docvault_audit_keys::KeyLifecycleManager;
use docvault_audit_log::{ChainSigner, EventLogger, LogError};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{AuditError, Result};

const EVENT_SOURCE: &str = "audit-scheduler";

/// What happened to yesterday's partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SealOutcome {
    /// No partition for that date.
    Skipped,
    Sealed { hash: ChainHash, line_count: u64 },
    Failed { error: String },
}

/// The outcome for one partition considered by a rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSeal {
    pub date: NaiveDate,
    pub outcome: SealOutcome,
}

/// Result of [`RetentionScheduler::rotate_daily`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    /// Yesterday, the partition this rotation closes.
    pub date: NaiveDate,
    /// Every unsealed closed partition that was considered, oldest first.
    pub seals: Vec<PartitionSeal>,
    /// Events written by the flush of today's partition.
    pub flushed: usize,
}

static SKIPPED: SealOutcome = SealOutcome::Skipped;

impl RotationReport {
    /// Outcome for `date`, `Skipped` if it was not considered.
    pub fn outcome(&self, date: NaiveDate) -> &SealOutcome {
        self.seals
            .iter()
            .find(|s| s.date == date)
            .map_or(&SKIPPED, |s| &s.outcome)
    }

    /// Outcome for yesterday's partition.
    pub fn yesterday(&self) -> &SealOutcome {
        self.outcome(self.date)
    }

    pub fn failed(&self) -> usize {
        self.seals
            .iter()
            .filter(|s| matches!(s.outcome, SealOutcome::Failed { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    /// `None` when a directory could not be listed.
    pub date: Option<NaiveDate>,
    pub error: String,
}

/// Result of [`RetentionScheduler::cleanup_old_logs`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Dates strictly before this one were eligible.
    pub cutoff: Option<NaiveDate>,
    pub deleted_partitions: Vec<NaiveDate>,
    pub deleted_seals: Vec<NaiveDate>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn deleted(&self) -> usize {
        self.deleted_partitions.len() + self.deleted_seals.len()
    }
}

/// Partition counts for the retention window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionStats {
    pub total: usize,
    pub oldest_date: Option<NaiveDate>,
    pub newest_date: Option<NaiveDate>,
    pub eligible_for_deletion: usize,
    pub retention_days: u32,
}

/// Everything one daily cycle did.
#[derive(Debug)]
pub struct DailyCycleReport {
    pub rotation: Result<RotationReport>,
    pub cleanup: Result<CleanupReport>,
    pub key_rotation_due: bool,
}

impl DailyCycleReport {
    /// Every seal and deletion went through.
    pub fn is_complete(&self) -> bool {
        let rotated = self.rotation.as_ref().is_ok_and(|r| r.failed() == 0);
        let cleaned = self.cleanup.as_ref().is_ok_and(|c| c.failures.is_empty());
        rotated && cleaned
    }
}

/// Drives sealing and retention for one audit directory.
pub struct RetentionScheduler {
    logger: Arc<EventLogger>,
    chain: Arc<ChainSigner>,
    keys: Arc<KeyLifecycleManager>,
    clock: SharedClock,
    retention_days: u32,
    tick_interval: Duration,
}

impl RetentionScheduler {
    pub fn new(
        logger: Arc<EventLogger>,
        chain: Arc<ChainSigner>,
        keys: Arc<KeyLifecycleManager>,
        clock: SharedClock,
        retention_days: u32,
        tick_interval: Duration,
    ) -> Self {
        Self {
            logger,
            chain,
            keys,
            clock,
            retention_days,
            tick_interval,
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// First date that is kept; anything strictly older is deleted.
    fn cutoff(&self) -> Option<NaiveDate> {
        self.clock
            .today()
            .checked_sub_days(Days::new(u64::from(self.retention_days)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rotation
    // ─────────────────────────────────────────────────────────────────────────

    /// Seal yesterday's partition and any older unsealed one still inside
    /// the retention window, then flush today's.
    ///
    /// Does nothing when there is no partition to seal. Sealing failures are
    /// only reported and the partition is tried again on the next run. Flush
    /// errors are returned.
    pub async fn rotate_daily(&self) -> Result<RotationReport> {
        let today = self.clock.today();
        let date = today
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| AuditError::Configuration(format!("no day before {today}")))?;

        let pending = self.unsealed_before(today).await?;
        if pending.is_empty() {
            return Ok(RotationReport {
                date,
                seals: Vec::new(),
                flushed: 0,
            });
        }

        let mut seals = Vec::with_capacity(pending.len());
        for day in pending {
            let outcome = self.seal(day).await;
            seals.push(PartitionSeal { date: day, outcome });
        }

        let flushed = self.logger.flush().await?;
        Ok(RotationReport {
            date,
            seals,
            flushed,
        })
    }

    /// Closed partitions inside the retention window that have no seal.
    async fn unsealed_before(&self, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        let cutoff = self.cutoff();
        let layout = self.chain.layout().clone();
        let dates = tokio::task::spawn_blocking(move || {
            let sealed = layout.list_sealed_dates()?;
            let partitions = layout.list_dates()?;
            Ok::<_, LogError>(
                partitions
                    .into_iter()
                    .filter(|d| *d < today && cutoff.map_or(true, |c| *d >= c))
                    .filter(|d| sealed.binary_search(d).is_err())
                    .collect::<Vec<_>>(),
            )
        })
        .await
        .map_err(LogError::from)??;
        Ok(dates)
    }

    async fn seal(&self, date: NaiveDate) -> SealOutcome {
        match self.chain.sign_daily_log(date).await {
            Ok(seal) => {
                self.record(
                    AuditEvent::success(EventType::AuditLogSealed)
                        .with_metadata("date", format_date(date))
                        .with_metadata("hash", seal.hash.to_hex())
                        .with_metadata("line_count", seal.line_count),
                )
                .await;
                SealOutcome::Sealed {
                    hash: seal.hash,
                    line_count: seal.line_count,
                }
            }
            Err(LogError::Empty(_)) => {
                debug!(date = %date, "empty audit partition left unsealed");
                SealOutcome::Skipped
            }
            Err(e) => {
                error!(date = %date, error = %e, "daily seal failed");
                self.record(
                    AuditEvent::new(EventType::AuditLogSealed, EventStatus::Error)
                        .with_metadata("date", format_date(date))
                        .with_metadata("error", e.to_string()),
                )
                .await;
                SealOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Retention
    // ─────────────────────────────────────────────────────────────────────────

    /// Delete partitions and seals older than the retention window.
    ///
    /// Each file is removed independently; failures are collected in the
    /// report.
    pub async fn cleanup_old_logs(&self) -> Result<CleanupReport> {
        let Some(cutoff) = self.cutoff() else {
            return Ok(CleanupReport::default());
        };

        let layout = self.chain.layout().clone();
        let report = tokio::task::spawn_blocking(move || {
            let mut report = CleanupReport {
                cutoff: Some(cutoff),
                ..CleanupReport::default()
            };

            let partitions = layout.list_dates().unwrap_or_else(|e| {
                warn!(error = %e, "could not list audit partitions");
                report.failures.push(CleanupFailure {
                    date: None,
                    error: e.to_string(),
                });
                Vec::new()
            });
            for date in partitions.into_iter().filter(|d| *d < cutoff) {
                match layout.remove_partition(date) {
                    Ok(true) => {
                        info!(date = %date, "expired audit partition deleted");
                        report.deleted_partitions.push(date);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(date = %date, error = %e, "could not delete audit partition");
                        report.failures.push(CleanupFailure {
                            date: Some(date),
                            error: e.to_string(),
                        });
                    }
                }
            }

            let seals = layout.list_sealed_dates().unwrap_or_else(|e| {
                warn!(error = %e, "could not list audit seals");
                report.failures.push(CleanupFailure {
                    date: None,
                    error: e.to_string(),
                });
                Vec::new()
            });
            for date in seals.into_iter().filter(|d| *d < cutoff) {
                match layout.remove_seal(date) {
                    Ok(true) => {
                        info!(date = %date, "expired audit seal deleted");
                        report.deleted_seals.push(date);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(date = %date, error = %e, "could not delete audit seal");
                        report.failures.push(CleanupFailure {
                            date: Some(date),
                            error: e.to_string(),
                        });
                    }
                }
            }

            report
        })
        .await
        .map_err(LogError::from)?;

        if report.deleted() > 0 || !report.failures.is_empty() {
            let status = if report.failures.is_empty() {
                EventStatus::Success
            } else {
                EventStatus::Error
            };
            self.record(
                AuditEvent::new(EventType::AuditLogCleanup, status)
                    .with_metadata("cutoff", format_date(cutoff))
                    .with_metadata("deleted_partitions", report.deleted_partitions.len())
                    .with_metadata("deleted_seals", report.deleted_seals.len())
                    .with_metadata("failures", report.failures.len()),
            )
            .await;
        }
        Ok(report)
    }

    pub async fn get_retention_stats(&self) -> Result<RetentionStats> {
        let layout = self.chain.layout().clone();
        let dates = tokio::task::spawn_blocking(move || layout.list_dates())
            .await
            .map_err(LogError::from)??;

        let eligible = match self.cutoff() {
            Some(cutoff) => dates.iter().filter(|d| **d < cutoff).count(),
            None => 0,
        };
        Ok(RetentionStats {
            total: dates.len(),
            oldest_date: dates.first().copied(),
            newest_date: dates.last().copied(),
            eligible_for_deletion: eligible,
            retention_days: self.retention_days,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Driving
    // ─────────────────────────────────────────────────────────────────────────

    /// Rotate, clean up and check whether the signing key is due.
    pub async fn run_daily_cycle(&self) -> DailyCycleReport {
        let rotation = self.rotate_daily().await;
        if let Err(e) = &rotation {
            error!(error = %e, "daily rotation failed");
        }

        let cleanup = self.cleanup_old_logs().await;
        if let Err(e) = &cleanup {
            error!(error = %e, "retention cleanup failed");
        }

        let key_rotation_due = self.keys.should_rotate();
        if key_rotation_due {
            warn!(
                kid = %self.keys.current_kid(),
                due = %self.keys.next_rotation(),
                "signing key rotation is due"
            );
        }

        DailyCycleReport {
            rotation,
            cleanup,
            key_rotation_due,
        }
    }

    /// Run the daily cycle in the background until `shutdown` turns true.
    ///
    /// The first tick fires immediately, so a restarted service seals the
    /// previous day right away. A cycle that left a seal or deletion undone
    /// runs again on the next tick.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_run: Option<NaiveDate> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let today = self.clock.today();
                        if last_run == Some(today) {
                            continue;
                        }
                        if self.run_daily_cycle().await.is_complete() {
                            last_run = Some(today);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.logger.log(event.with_source(EVENT_SOURCE)).await {
            warn!(error = %e, "could not record scheduler event");
        }
    }
}
