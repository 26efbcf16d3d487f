//! Server-side span storage
//!
//! ## Architecture
//!
//! ```text
//! ingest handler
//!     ↓ write(records)
//! SpanWriter ── Connected ──→ SpanSink::insert_batch (idempotent upsert)
//!     │
//!     └─ Disconnected/Connecting ──→ BoundedQueue buffer (drop-oldest)
//!                                        ↑ flushed oldest-first on reconnect
//! ```
//!
//! The [`SinkConnector`]/[`SpanSink`] traits are the database seam; the
//! SQLite implementation lives in [`database`].

pub mod cleanup;
pub mod database;
pub mod record;
pub mod writer;

pub use cleanup::{spawn_cleanup_task, CleanupConfig};
pub use database::{SinkConnector, SpanDb, SpanSink, SqliteConnector};
pub use record::SpanRecord;
pub use writer::{ConnectionState, SpanWriter, WriterConfig};

use thiserror::Error;

/// Errors raised by the database seam
///
/// These never reach ingestion callers: the writer recovers from all of them
/// by buffering and reconnecting.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database connection failed: {0}")]
    Connect(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
