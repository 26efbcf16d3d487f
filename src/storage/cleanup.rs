//! Background retention task for stored spans
//!
//! Deletes spans older than `retention_days` once per day at `cleanup_hour`.
//! The task borrows the writer's live connection; while the database is
//! unreachable a run is skipped and retried on the next check.

use crate::storage::{SpanDb, SpanWriter, SqliteConnector, StorageError};
use chrono::{Datelike, Timelike};
use std::time::Duration;
use tokio::time;

/// Cleanup configuration
#[derive(Debug, Clone, Copy)]
pub struct CleanupConfig {
    /// Spans whose start time is older than this are deleted
    pub retention_days: u32,

    /// Hour of day to run cleanup (0-23)
    pub cleanup_hour: u32,

    /// How often to check whether it is cleanup time
    pub check_interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            cleanup_hour: 3,
            check_interval: Duration::from_secs(3600),
        }
    }
}

/// Spawn the background cleanup task
///
/// # Example
///
/// ```ignore
/// let config = CleanupConfig { retention_days: 7, ..Default::default() };
/// spawn_cleanup_task(writer.clone(), config);
/// ```
pub fn spawn_cleanup_task(
    writer: SpanWriter<SqliteConnector>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        cleanup_loop(writer, config).await;
    })
}

async fn cleanup_loop(writer: SpanWriter<SqliteConnector>, config: CleanupConfig) {
    let mut interval = time::interval(config.check_interval);
    let mut last_cleanup_day: Option<u32> = None;

    loop {
        interval.tick().await;

        let now = chrono::Local::now();
        let current_day = now.ordinal();

        if now.hour() != config.cleanup_hour || Some(current_day) == last_cleanup_day {
            continue;
        }

        let Some(db) = writer.sink() else {
            tracing::warn!("Skipping span cleanup: database not connected");
            continue;
        };

        tracing::info!(
            retention_days = config.retention_days,
            "Starting scheduled span cleanup"
        );

        match run_cleanup_now(&db, config.retention_days).await {
            Ok(_) => last_cleanup_day = Some(current_day),
            Err(e) => {
                tracing::error!(error = %e, "Span cleanup failed");
            }
        }
    }
}

/// Cutoff in Unix nanoseconds for a retention window ending now
pub fn retention_cutoff(retention_days: u32) -> i64 {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days));
    cutoff.timestamp_nanos_opt().unwrap_or(0)
}

/// Delete expired spans immediately
pub async fn run_cleanup_now(db: &SpanDb, retention_days: u32) -> Result<u64, StorageError> {
    let deleted = db.delete_spans_before(retention_cutoff(retention_days)).await?;

    tracing::info!(
        spans_deleted = deleted,
        retention_days = retention_days,
        "Span cleanup completed"
    );

    Ok(deleted)
}
