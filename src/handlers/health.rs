use crate::storage::SpanWriter;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

/// Buffer fill ratio at which a connected collector stops being healthy
pub const DEGRADED_BUFFER_USAGE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Status from database connectivity and writer buffer usage
    pub fn evaluate(db_connected: bool, buffer_usage: f64) -> Self {
        if buffer_usage >= 1.0 || (db_connected && buffer_usage >= DEGRADED_BUFFER_USAGE) {
            Self::Unhealthy
        } else if db_connected {
            Self::Healthy
        } else {
            Self::Degraded
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub db_connected: bool,
    pub buffer_usage: f64,
    pub version: String,
}

/// Handle GET /v1/health
///
/// Always 200; callers read `status` to decide.
pub async fn health_check(State(writer): State<SpanWriter>) -> Json<HealthResponse> {
    let db_connected = writer.db_connected();
    let buffer_usage = writer.buffer_usage();

    Json(HealthResponse {
        status: HealthStatus::evaluate(db_connected, buffer_usage),
        db_connected,
        buffer_usage,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::WriterConfig;

    #[test]
    fn test_status_transitions() {
        assert_eq!(HealthStatus::evaluate(true, 0.1), HealthStatus::Healthy);
        assert_eq!(HealthStatus::evaluate(false, 0.5), HealthStatus::Degraded);
        assert_eq!(HealthStatus::evaluate(false, 1.0), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::evaluate(true, 1.0), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::evaluate(true, 0.95), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::evaluate(false, 0.95), HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_health_of_unconnected_writer() {
        let writer = SpanWriter::sqlite(WriterConfig::default());

        let Json(body) = health_check(State(writer)).await;

        assert_eq!(body.status, HealthStatus::Degraded);
        assert!(!body.db_connected);
        assert_eq!(body.buffer_usage, 0.0);
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }
}
