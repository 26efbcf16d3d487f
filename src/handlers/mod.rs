pub mod health;
pub mod metrics_handler;
pub mod traces;

use crate::rate_limit::TokenBucketRateLimiter;
use crate::storage::SpanWriter;
use axum::extract::FromRef;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone, FromRef)]
pub struct AppState {
    pub writer: SpanWriter,
    pub limiter: Arc<TokenBucketRateLimiter>,
    pub metrics: Arc<PrometheusHandle>,
}
