use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Settings,
    handlers::{self, AppState},
    metrics,
    rate_limit::{self, TokenBucketRateLimiter},
    signals::setup_signal_handlers,
    storage::{spawn_cleanup_task, CleanupConfig, SpanWriter, WriterConfig},
};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Start the collector
///
/// This function:
/// 1. Initializes metrics
/// 2. Connects the span writer (falls back to buffering if the database is down)
/// 3. Starts the retention cleanup and bucket sweep tasks
/// 4. Serves until SIGTERM/SIGINT, then drains and closes the writer
pub async fn start_server(settings: Settings) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let writer = SpanWriter::sqlite(WriterConfig {
        max_buffer_size: settings.buffer_max_size,
        retry_interval: settings.retry_interval(),
        ..Default::default()
    });
    writer.connect(&settings.database_url).await;

    let limiter = Arc::new(TokenBucketRateLimiter::new(
        settings.rate_limit_requests_per_second,
        settings.rate_limit_burst_size,
        settings.rate_limit_enabled,
    ));

    let cleanup_task = spawn_cleanup_task(
        writer.clone(),
        CleanupConfig {
            retention_days: settings.retention_days,
            ..Default::default()
        },
    );
    let sweep_task = rate_limit::spawn_sweep_task(limiter.clone(), settings.rate_limit_stale_after());

    let state = AppState {
        writer: writer.clone(),
        limiter,
        metrics: metrics_handle,
    };
    let app = create_router(state);

    let addr = SocketAddr::from((
        settings.host.parse::<std::net::IpAddr>()?,
        settings.port,
    ));

    info!("Starting hikari collector on {}", addr);
    info!(
        "Configuration: buffer {} spans, retry every {}s, rate limit {} ({}/s, burst {})",
        settings.buffer_max_size,
        settings.db_retry_interval_seconds,
        if settings.rate_limit_enabled { "on" } else { "off" },
        settings.rate_limit_requests_per_second,
        settings.rate_limit_burst_size
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, draining connections...");
    })
    .await?;

    cleanup_task.abort();
    sweep_task.abort();
    writer.close().await;

    signal_handle.await?;
    info!("Collector stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
///
/// Only `/v1/traces` passes through the rate limiter.
pub fn create_router(state: AppState) -> Router {
    let ingest_routes = Router::new()
        .route("/v1/traces", post(handlers::traces::ingest_traces))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit::rate_limit_middleware,
        ));

    Router::new()
        .route("/v1/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .merge(ingest_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
