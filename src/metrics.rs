use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe collector metrics
///
/// Fails if a global recorder is already installed.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Build a handle without installing it globally (tests, embedded use)
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

fn init_metric_descriptions() {
    describe_counter!(
        "hikari_spans_accepted_total",
        "Spans accepted by the ingestion endpoint"
    );
    describe_counter!(
        "hikari_spans_rejected_total",
        "Spans rejected by validation"
    );
    describe_counter!(
        "hikari_spans_dropped_total",
        "Spans evicted from a full buffer"
    );
    describe_counter!(
        "hikari_rate_limited_total",
        "Requests rejected by the rate limiter"
    );
    describe_counter!(
        "hikari_export_batches_total",
        "Client export batches by outcome"
    );
    describe_gauge!(
        "hikari_buffer_usage",
        "Writer buffer fill ratio (0.0-1.0)"
    );
    describe_gauge!(
        "hikari_db_connected",
        "1 if the collector is connected to its database"
    );
    describe_gauge!(
        "hikari_collector_info",
        "Collector version information"
    );

    gauge!("hikari_collector_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

pub fn record_spans_accepted(count: u64) {
    counter!("hikari_spans_accepted_total").increment(count);
}

pub fn record_spans_rejected(count: u64) {
    counter!("hikari_spans_rejected_total").increment(count);
}

/// Spans lost to overflow; `component` is "writer" or "exporter"
pub fn record_spans_dropped(component: &'static str, count: u64) {
    counter!("hikari_spans_dropped_total", "component" => component).increment(count);
}

pub fn record_rate_limited() {
    counter!("hikari_rate_limited_total").increment(1);
}

/// `outcome` is "sent" or "dropped"
pub fn record_export_batch(outcome: &'static str) {
    counter!("hikari_export_batches_total", "outcome" => outcome).increment(1);
}

pub fn set_buffer_usage(usage: f64) {
    gauge!("hikari_buffer_usage").set(usage);
}

pub fn set_db_connected(connected: bool) {
    gauge!("hikari_db_connected").set(if connected { 1.0 } else { 0.0 });
}
