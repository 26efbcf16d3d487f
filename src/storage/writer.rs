//! Buffered, reconnecting span writer
//!
//! The writer owns the database link and an in-memory overflow buffer:
//! - `Connected`: batches go straight to [`SpanSink::insert_batch`]
//! - `Disconnected`/`Connecting`: batches go to a drop-oldest buffer
//! - A single background loop retries the connection every
//!   `retry_interval` and flushes the buffer oldest-first once it succeeds
//!
//! Writes never fail from the caller's point of view. The only data loss is
//! buffer overflow, which is logged and counted.

use crate::buffer::BoundedQueue;
use crate::storage::database::{SinkConnector, SpanSink, SqliteConnector};
use crate::storage::SpanRecord;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Writer tuning
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Spans held in memory while the database is unavailable (default: 50,000)
    pub max_buffer_size: usize,
    /// Delay between reconnection attempts (default: 10s)
    pub retry_interval: Duration,
    /// Spans per insert while flushing the buffer (default: 1,000)
    pub flush_chunk_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 50_000,
            retry_interval: Duration::from_secs(10),
            flush_chunk_size: 1_000,
        }
    }
}

/// State of the writer's database link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Span writer handle
///
/// Cheap to clone; all clones share the same buffer and connection.
pub struct SpanWriter<C: SinkConnector = SqliteConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: SinkConnector> Clone for SpanWriter<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<C: SinkConnector> {
    connector: C,
    config: WriterConfig,
    state: Mutex<WriterState<C::Sink>>,
    shutdown: watch::Sender<bool>,
}

struct WriterState<S> {
    connection: ConnectionState,
    sink: Option<Arc<S>>,
    buffer: BoundedQueue<SpanRecord>,
    database_url: Option<String>,
    /// True while a reconnection loop owns the link; cleared in the same
    /// critical section that marks the link `Connected`
    reconnecting: bool,
    retry_task: Option<JoinHandle<()>>,
    closed: bool,
}

impl SpanWriter<SqliteConnector> {
    /// Writer backed by SQLite with default pool settings
    pub fn sqlite(config: WriterConfig) -> Self {
        Self::new(SqliteConnector::default(), config)
    }
}

impl<C: SinkConnector> SpanWriter<C> {
    pub fn new(connector: C, config: WriterConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let buffer = BoundedQueue::new(config.max_buffer_size);

        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                state: Mutex::new(WriterState {
                    connection: ConnectionState::Disconnected,
                    sink: None,
                    buffer,
                    database_url: None,
                    reconnecting: false,
                    retry_task: None,
                    closed: false,
                }),
                shutdown,
            }),
        }
    }

    /// Attempt one connection to `database_url`
    ///
    /// On success the buffer is flushed and the writer becomes `Connected`.
    /// On failure the writer stays `Disconnected` and the reconnection loop
    /// takes over. The URL is remembered for later reconnects.
    pub async fn connect(&self, database_url: &str) {
        {
            let mut st = self.inner.lock_state();
            st.database_url = Some(database_url.to_string());

            if st.closed || st.connection == ConnectionState::Connected {
                return;
            }
            if st.reconnecting {
                tracing::debug!("Reconnection loop already active, skipping connect");
                return;
            }
            st.connection = ConnectionState::Connecting;
        }

        let mut shutdown = self.inner.shutdown.subscribe();
        match self.inner.connector.connect(database_url).await {
            Ok(sink) => {
                tracing::info!("Connected to database");
                if !self.inner.install_and_flush(Arc::new(sink), &mut shutdown).await {
                    let mut st = self.inner.lock_state();
                    self.inner.ensure_retry_loop(&mut st);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to database");
                let mut st = self.inner.lock_state();
                st.connection = ConnectionState::Disconnected;
                self.inner.ensure_retry_loop(&mut st);
            }
        }
        self.inner.publish_gauges();
    }

    /// Persist `records`, or buffer them if the database is unavailable
    ///
    /// Never fails. A failed insert moves the writer to `Disconnected`, puts
    /// the batch at the front of the buffer and starts reconnecting.
    pub async fn write(&self, records: Vec<SpanRecord>) {
        if records.is_empty() {
            return;
        }
        self.inner.write(records).await;
        self.inner.publish_gauges();
    }

    /// Buffered span count divided by buffer capacity
    pub fn buffer_usage(&self) -> f64 {
        self.inner.lock_state().buffer.usage()
    }

    pub fn buffered_len(&self) -> usize {
        self.inner.lock_state().buffer.len()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock_state().connection
    }

    pub fn db_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// The live database handle, if connected
    ///
    /// Query consumers share this handle's pool with the writer.
    pub fn sink(&self) -> Option<Arc<C::Sink>> {
        let st = self.inner.lock_state();
        match st.connection {
            ConnectionState::Connected => st.sink.clone(),
            _ => None,
        }
    }

    /// Whether a reconnection loop currently owns the link
    pub fn is_reconnecting(&self) -> bool {
        self.inner.lock_state().reconnecting
    }

    /// Stop the reconnection loop and release the database handle
    ///
    /// Waits for the loop task to finish before closing the sink. Buffered
    /// spans that were never flushed are discarded.
    pub async fn close(&self) {
        let task = {
            let mut st = self.inner.lock_state();
            st.closed = true;
            st.reconnecting = false;
            st.connection = ConnectionState::Disconnected;
            st.retry_task.take()
        };

        self.inner.shutdown.send_replace(true);

        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Reconnection task ended abnormally");
                }
            }
        }

        let (sink, pending) = {
            let mut st = self.inner.lock_state();
            st.connection = ConnectionState::Disconnected;
            (st.sink.take(), st.buffer.len())
        };

        if let Some(sink) = sink {
            sink.close().await;
            tracing::info!("Database connection closed");
        }

        if pending > 0 {
            tracing::warn!(count = pending, "Span writer closed with unflushed buffered spans");
        }
        crate::metrics::set_db_connected(false);
    }
}

impl<C: SinkConnector> Inner<C> {
    fn lock_state(&self) -> MutexGuard<'_, WriterState<C::Sink>> {
        // A poisoned lock means a panic mid-update elsewhere; the buffer and
        // flags are still structurally valid.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn write(self: &Arc<Self>, records: Vec<SpanRecord>) {
        loop {
            let sink = {
                let mut st = self.lock_state();
                match (st.connection, st.sink.clone()) {
                    (ConnectionState::Connected, Some(sink)) => sink,
                    _ => {
                        let count = records.len();
                        buffer_records(&mut st.buffer, records);
                        tracing::debug!(
                            count = count,
                            state = st.connection.as_str(),
                            "Database unavailable, buffered spans"
                        );
                        if st.connection == ConnectionState::Disconnected {
                            self.ensure_retry_loop(&mut st);
                        }
                        return;
                    }
                }
            };

            match sink.insert_batch(&records).await {
                Ok(inserted) => {
                    tracing::debug!(
                        count = records.len(),
                        inserted = inserted,
                        "Wrote spans to database"
                    );
                    return;
                }
                Err(e) => {
                    let mut st = self.lock_state();
                    let is_current = st.sink.as_ref().is_some_and(|s| Arc::ptr_eq(s, &sink));

                    if !is_current && st.connection == ConnectionState::Connected {
                        // A newer connection was established meanwhile; use it.
                        continue;
                    }

                    tracing::error!(
                        error = %e,
                        count = records.len(),
                        "Failed to write spans to database"
                    );

                    if is_current {
                        st.connection = ConnectionState::Disconnected;
                        st.sink = None;
                    }

                    let dropped = st.buffer.prepend(records);
                    report_dropped(dropped, st.buffer.capacity());
                    self.ensure_retry_loop(&mut st);
                    return;
                }
            }
        }
    }

    /// Start the reconnection loop unless one is already active
    fn ensure_retry_loop(self: &Arc<Self>, st: &mut WriterState<C::Sink>) {
        if st.closed || st.reconnecting {
            return;
        }
        let Some(url) = st.database_url.clone() else {
            tracing::error!("Cannot retry connection: no database URL stored");
            return;
        };

        st.reconnecting = true;
        st.connection = ConnectionState::Disconnected;

        let inner = self.clone();
        let shutdown = self.shutdown.subscribe();
        st.retry_task = Some(tokio::spawn(async move {
            inner.retry_loop(url, shutdown).await;
        }));

        tracing::info!(
            retry_interval_secs = self.config.retry_interval.as_secs_f64(),
            "Started database reconnection loop"
        );
    }

    async fn retry_loop(self: Arc<Self>, database_url: String, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_interval) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            {
                let mut st = self.lock_state();
                if st.closed {
                    break;
                }
                st.connection = ConnectionState::Connecting;
            }
            tracing::info!("Retrying database connection...");

            let attempt = tokio::select! {
                result = self.connector.connect(&database_url) => result,
                _ = shutdown.changed() => break,
            };

            match attempt {
                Ok(sink) => {
                    tracing::info!("Database connection restored");
                    if self.install_and_flush(Arc::new(sink), &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Database reconnection failed");
                    let mut st = self.lock_state();
                    if !st.closed {
                        st.connection = ConnectionState::Disconnected;
                    }
                }
            }
            self.publish_gauges();
        }

        self.publish_gauges();
        tracing::debug!("Database reconnection loop stopped");
    }

    /// Adopt a fresh sink and drain the buffer into it
    ///
    /// The link stays `Connecting` while draining so concurrent writes keep
    /// landing behind older buffered spans. Returns `true` once the buffer is
    /// empty and the link is `Connected`, or once the writer is closed;
    /// `false` if an insert failed, in which case the chunk is back at the
    /// front of the buffer.
    async fn install_and_flush(
        &self,
        sink: Arc<C::Sink>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let closed = {
            let mut st = self.lock_state();
            if !st.closed {
                st.sink = Some(sink.clone());
            }
            st.closed
        };
        if closed {
            sink.close().await;
            return true;
        }

        let mut flushed = 0usize;
        loop {
            let chunk = {
                let mut st = self.lock_state();
                if st.closed {
                    return true;
                }
                if st.buffer.is_empty() {
                    st.connection = ConnectionState::Connected;
                    st.reconnecting = false;
                    break;
                }
                st.buffer.drain_front(self.config.flush_chunk_size)
            };

            let result = tokio::select! {
                result = sink.insert_batch(&chunk) => Some(result),
                _ = shutdown.changed() => None,
            };

            match result {
                Some(Ok(_)) => flushed += chunk.len(),
                Some(Err(e)) => {
                    tracing::error!(
                        error = %e,
                        count = chunk.len(),
                        "Failed to flush buffered spans"
                    );
                    let mut st = self.lock_state();
                    let dropped = st.buffer.prepend(chunk);
                    report_dropped(dropped, st.buffer.capacity());
                    if st.closed {
                        return true;
                    }
                    st.connection = ConnectionState::Disconnected;
                    st.sink = None;
                    return false;
                }
                None => {
                    // Closed mid-insert; the chunk still counts as unflushed.
                    self.lock_state().buffer.prepend(chunk);
                    return true;
                }
            }
        }

        if flushed > 0 {
            tracing::info!(count = flushed, "Flushed buffered spans");
        }
        self.publish_gauges();
        true
    }

    fn publish_gauges(&self) {
        let (usage, connected) = {
            let st = self.lock_state();
            (st.buffer.usage(), st.connection == ConnectionState::Connected)
        };
        crate::metrics::set_buffer_usage(usage);
        crate::metrics::set_db_connected(connected);
    }
}

fn buffer_records(buffer: &mut BoundedQueue<SpanRecord>, records: Vec<SpanRecord>) {
    let dropped = buffer.extend(records);
    report_dropped(dropped, buffer.capacity());
}

fn report_dropped(dropped: usize, capacity: usize) {
    if dropped > 0 {
        tracing::warn!(
            capacity = capacity,
            dropped = dropped,
            "Buffer full, dropped oldest spans"
        );
        crate::metrics::record_spans_dropped("writer", dropped as u64);
    }
}
