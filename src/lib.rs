pub mod attributes;
pub mod buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod exporter;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod otlp;
pub mod rate_limit;
pub mod sdk;
pub mod server;
pub mod signals;
pub mod storage;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides `level`. `format` is `"json"` or anything else for
/// human-readable text. Can only be called once per process.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
