//! SQLite database layer for cost spans
//!
//! This module provides:
//! - The [`SinkConnector`]/[`SpanSink`] seam used by the span writer
//! - Connection pooling with automatic migrations
//! - Idempotent batch upsert keyed by `(time, span_id)`
//! - Retention deletes for the cleanup task

use crate::storage::{SpanRecord, StorageError};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// A live database handle that accepts span batches
#[async_trait]
pub trait SpanSink: Send + Sync + 'static {
    /// Insert a batch, silently skipping rows whose `(time, span_id)` already exists
    ///
    /// Returns the number of rows actually inserted.
    async fn insert_batch(&self, records: &[SpanRecord]) -> Result<u64, StorageError>;

    /// Release the underlying connection resources
    async fn close(&self);
}

/// Opens [`SpanSink`]s; called once per connection attempt
#[async_trait]
pub trait SinkConnector: Send + Sync + 'static {
    type Sink: SpanSink;

    async fn connect(&self, database_url: &str) -> Result<Self::Sink, StorageError>;
}

/// Connector for SQLite databases (e.g. `sqlite:./data/hikari.db`)
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for SqliteConnector {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl SinkConnector for SqliteConnector {
    type Sink = SpanDb;

    async fn connect(&self, database_url: &str) -> Result<SpanDb, StorageError> {
        SpanDb::connect_with(database_url, self).await
    }
}

/// Span database handle
///
/// Manages the SQLite connection pool. The pool is shared with read-only
/// query consumers through [`SpanDb::pool`].
pub struct SpanDb {
    pool: SqlitePool,
}

impl SpanDb {
    /// Connect with default pool settings and run migrations
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = SpanDb::connect("sqlite:./data/hikari.db").await?;
    /// ```
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        Self::connect_with(database_url, &SqliteConnector::default()).await
    }

    async fn connect_with(
        database_url: &str,
        settings: &SqliteConnector,
    ) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::Connect(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)  // Concurrent readers while writing
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connect(e.to_string()))?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(pool).await?;

        tracing::debug!("Span database migrations completed");
        Ok(())
    }

    /// Insert spans in a single transaction, ignoring duplicates
    pub async fn insert_spans(&self, records: &[SpanRecord]) -> Result<u64, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for span in records {
            let result = sqlx::query(
                "INSERT INTO spans (
                    time, trace_id, span_id, span_name, pipeline_id,
                    stage, model, provider, tokens_input, tokens_output,
                    cost_input, cost_output, cost_total, duration_ms
                 )
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (time, span_id) DO NOTHING"
            )
            .bind(span.time())
            .bind(&span.trace_id)
            .bind(&span.span_id)
            .bind(&span.span_name)
            .bind(&span.pipeline_id)
            .bind(&span.stage)
            .bind(&span.model)
            .bind(&span.provider)
            .bind(span.tokens_input)
            .bind(span.tokens_output)
            .bind(span.cost_input)
            .bind(span.cost_output)
            .bind(span.cost_total)
            .bind(span.duration_ms())
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        Ok(inserted)
    }

    /// Total number of stored spans
    pub async fn count_spans(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM spans")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    /// Span ids in storage order by time
    pub async fn span_ids_by_time(&self) -> Result<Vec<String>, StorageError> {
        let ids = sqlx::query_scalar("SELECT span_id FROM spans ORDER BY time ASC, span_id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    /// Delete spans that started before `cutoff_unix_nano`
    pub async fn delete_spans_before(&self, cutoff_unix_nano: i64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM spans WHERE time < ?")
            .bind(cutoff_unix_nano)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Get the underlying connection pool (for query consumers)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SpanSink for SpanDb {
    async fn insert_batch(&self, records: &[SpanRecord]) -> Result<u64, StorageError> {
        self.insert_spans(records).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
