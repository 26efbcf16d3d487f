//! Client-side span exporter
//!
//! Decouples instrumented calls from network I/O:
//! - `enqueue` appends to a bounded drop-oldest queue and never fails
//! - A full batch is flushed inline; a background timer flushes the rest
//! - Each batch is sent with a fixed retry schedule and dropped when the
//!   schedule is exhausted
//!
//! The queue lock is held only while pushing or draining, never across a send.

mod transport;

pub use transport::{ExportError, HttpTransport, Transport};

use crate::buffer::BoundedQueue;
use crate::otlp::{ExportTraceRequest, OtlpSpan};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Exporter configuration
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Collector base URL; batches go to `{endpoint}/v1/traces`
    pub endpoint: String,
    pub max_queue_size: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// One attempt per entry; the delay is slept after a failed attempt
    /// when another attempt follows
    pub retry_delays: Vec<Duration>,
    pub request_timeout: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            max_queue_size: 10_000,
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Batching span exporter
///
/// Must be created inside a Tokio runtime; the flush timer starts immediately.
pub struct SpanExporter<T: Transport = HttpTransport> {
    inner: Arc<ExporterInner<T>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

struct ExporterInner<T: Transport> {
    transport: T,
    config: ExporterConfig,
    queue: Mutex<BoundedQueue<OtlpSpan>>,
    stopped: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl SpanExporter<HttpTransport> {
    /// Exporter posting JSON batches to `config.endpoint`
    pub fn new(config: ExporterConfig) -> Result<Self, ExportError> {
        let transport = HttpTransport::new(&config.endpoint, config.request_timeout)?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> SpanExporter<T> {
    pub fn with_transport(transport: T, config: ExporterConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let inner = Arc::new(ExporterInner {
            transport,
            queue: Mutex::new(BoundedQueue::new(config.max_queue_size)),
            config,
            stopped: AtomicBool::new(false),
            stop_tx,
        });

        let timer = tokio::spawn(inner.clone().timer_loop(stop_rx));

        Self {
            inner,
            timer: Mutex::new(Some(timer)),
        }
    }

    /// Queue spans for export
    ///
    /// Never fails. Overflow evicts the oldest queued spans. When the queue
    /// reaches `batch_size`, one batch is flushed before returning. After
    /// `shutdown` this is a no-op.
    pub async fn enqueue(&self, spans: Vec<OtlpSpan>) {
        if spans.is_empty() {
            return;
        }

        let (dropped, len) = {
            let mut queue = self.inner.lock_queue();
            // Checked under the lock: shutdown's final drain either sees
            // these spans or this call sees the stop flag.
            if self.inner.stopped.load(Ordering::SeqCst) {
                return;
            }
            let dropped = queue.extend(spans);
            (dropped, queue.len())
        };

        if dropped > 0 {
            tracing::warn!(
                dropped = dropped,
                capacity = self.inner.config.max_queue_size,
                "Export queue full, dropped oldest spans"
            );
            crate::metrics::record_spans_dropped("exporter", dropped as u64);
        }

        if len >= self.inner.config.batch_size {
            self.inner.flush_batch().await;
        }
    }

    /// Send one batch; returns `false` if the batch was dropped
    pub async fn flush(&self) -> bool {
        self.inner.flush_batch().await
    }

    /// Drain the whole queue in batches
    ///
    /// Returns `true` if every batch was delivered.
    pub async fn force_flush(&self) -> bool {
        self.inner.flush_all().await
    }

    pub fn queued_len(&self) -> usize {
        self.inner.lock_queue().len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Stop the timer and flush whatever remains
    ///
    /// Later `enqueue` calls are ignored. Calling twice is harmless.
    pub async fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.stop_tx.send_replace(true);

        let timer = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Export timer ended abnormally");
                }
            }
        }

        let delivered = self.inner.flush_all().await;
        tracing::debug!(delivered = delivered, "Span exporter shut down");
    }
}

impl<T: Transport> Drop for SpanExporter<T> {
    fn drop(&mut self) {
        let timer = self
            .timer
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(timer) = timer {
            timer.abort();
        }
    }
}

impl<T: Transport> ExporterInner<T> {
    fn lock_queue(&self) -> MutexGuard<'_, BoundedQueue<OtlpSpan>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn timer_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let period = self.config.flush_interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = stop_rx.changed() => break,
            }
            if *stop_rx.borrow() {
                break;
            }

            let pending = !self.lock_queue().is_empty();
            if pending {
                self.flush_batch().await;
            }
        }
    }

    async fn flush_all(&self) -> bool {
        let mut delivered = true;
        loop {
            let batch = self.lock_queue().drain_front(self.config.batch_size);
            if batch.is_empty() {
                return delivered;
            }
            delivered &= self.send_batch(batch).await;
        }
    }

    async fn flush_batch(&self) -> bool {
        let batch = self.lock_queue().drain_front(self.config.batch_size);
        if batch.is_empty() {
            return true;
        }
        self.send_batch(batch).await
    }

    async fn send_batch(&self, batch: Vec<OtlpSpan>) -> bool {
        let count = batch.len();
        let body = match serde_json::to_vec(&ExportTraceRequest::from_spans(batch)) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, count = count, "Failed to serialize span batch");
                crate::metrics::record_export_batch("dropped");
                return false;
            }
        };

        let attempts = self.config.retry_delays.len().max(1);
        for attempt in 0..attempts {
            match self.transport.send(body.clone()).await {
                Ok(()) => {
                    tracing::debug!(count = count, attempt = attempt + 1, "Exported span batch");
                    crate::metrics::record_export_batch("sent");
                    return true;
                }
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        "Span export attempt failed"
                    );
                    if attempt + 1 < attempts {
                        if let Some(delay) = self.config.retry_delays.get(attempt) {
                            tokio::time::sleep(*delay).await;
                        }
                    }
                }
            }
        }

        tracing::warn!(
            count = count,
            attempts = attempts,
            "Dropped batch after exhausting export retries"
        );
        crate::metrics::record_export_batch("dropped");
        false
    }
}
