use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use hikari::{
    handlers::AppState,
    metrics,
    rate_limit::TokenBucketRateLimiter,
    server::create_router,
    storage::{SpanWriter, WriterConfig},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const START_NS: i64 = 1_750_000_000_000_000_000;

fn span_json(span_id: &str, stage: Option<&str>) -> Value {
    let mut attributes = vec![
        json!({"key": "hikari.model", "value": {"stringValue": "gpt-4o"}}),
        json!({"key": "hikari.provider", "value": {"stringValue": "openai"}}),
        json!({"key": "hikari.tokens.input", "value": {"intValue": "150"}}),
        json!({"key": "hikari.cost.total", "value": {"doubleValue": 0.0012}}),
    ];
    if let Some(stage) = stage {
        attributes.push(json!({"key": "hikari.stage", "value": {"stringValue": stage}}));
    }

    json!({
        "traceId": "trace-1",
        "spanId": span_id,
        "name": "openai.chat.completions.create",
        "startTimeUnixNano": START_NS.to_string(),
        "endTimeUnixNano": (START_NS + 400_000_000).to_string(),
        "attributes": attributes,
    })
}

fn export_body(spans: Vec<Value>) -> Value {
    json!({"resourceSpans": [{"scopeSpans": [{"spans": spans}]}]})
}

async fn connected_writer() -> SpanWriter {
    let writer = SpanWriter::sqlite(WriterConfig::default());
    writer.connect("sqlite::memory:").await;
    assert!(writer.db_connected());
    writer
}

fn app(writer: SpanWriter, limiter: TokenBucketRateLimiter) -> Router {
    create_router(AppState {
        writer,
        limiter: Arc::new(limiter),
        metrics: Arc::new(metrics::detached_handle()),
    })
}

fn post_traces(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/traces")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_ingest_persists_valid_spans_and_reports_invalid() {
    let writer = connected_writer().await;
    let app = app(writer.clone(), TokenBucketRateLimiter::new(100.0, 200, true));

    let body = export_body(vec![
        span_json("ok-1", Some("extract")),
        span_json("bad-1", None),
        span_json("ok-2", Some("summarize")),
    ]);
    let response = app.oneshot(post_traces(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-remaining"));

    let body = json_body(response).await;
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["rejected"], 1);
    assert_eq!(
        body["errors"][0],
        "Span bad-1: Missing required attributes: hikari.stage"
    );

    let db = writer.sink().unwrap();
    assert_eq!(db.span_ids_by_time().await.unwrap(), vec!["ok-1", "ok-2"]);
}

#[tokio::test]
async fn test_non_scalar_attribute_does_not_reject_batch() {
    let writer = connected_writer().await;
    let app = app(writer.clone(), TokenBucketRateLimiter::new(100.0, 200, true));

    let mut tagged = span_json("tagged", Some("extract"));
    tagged["attributes"].as_array_mut().unwrap().push(json!({
        "key": "llm.tags",
        "value": {"arrayValue": {"values": [{"stringValue": "invoice"}]}}
    }));
    let body = export_body(vec![tagged, span_json("plain", Some("extract"))]);

    let response = app.oneshot(post_traces(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["rejected"], 0);
    assert_eq!(
        writer.sink().unwrap().span_ids_by_time().await.unwrap(),
        vec!["plain", "tagged"]
    );
}

#[tokio::test]
async fn test_reingesting_same_batch_does_not_duplicate() {
    let writer = connected_writer().await;
    let app = app(writer.clone(), TokenBucketRateLimiter::new(100.0, 200, true));
    let body = export_body(vec![span_json("dup", Some("extract"))]);

    for _ in 0..2 {
        let response = app.clone().oneshot(post_traces(&body)).await.unwrap();
        assert_eq!(json_body(response).await["accepted"], 1);
    }

    assert_eq!(writer.sink().unwrap().count_spans().await.unwrap(), 1);
}

#[tokio::test]
async fn test_ingest_while_database_down_buffers() {
    // Never connected: spans are buffered, the response is unchanged
    let writer = SpanWriter::sqlite(WriterConfig {
        max_buffer_size: 1_000,
        ..Default::default()
    });
    let app = app(writer.clone(), TokenBucketRateLimiter::new(100.0, 200, true));

    let body = export_body(vec![span_json("a", Some("s")), span_json("b", Some("s"))]);
    let response = app.clone().oneshot(post_traces(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["accepted"], 2);
    assert_eq!(writer.buffered_len(), 2);

    let health = app
        .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let health = json_body(health).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["db_connected"], false);
    assert_eq!(health["buffer_usage"], 0.002);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let writer = connected_writer().await;
    let app = app(writer, TokenBucketRateLimiter::new(100.0, 200, true));

    let response = app
        .oneshot(post_traces(&json!({"resourceSpans": "nope"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["type"], "bad_request");
}

#[tokio::test]
async fn test_rate_limit_applies_to_ingest_only() {
    let writer = connected_writer().await;
    let app = app(writer, TokenBucketRateLimiter::new(1.0, 10, true));
    let body = export_body(vec![]);

    let mut statuses = Vec::new();
    for _ in 0..12 {
        let response = app.clone().oneshot(post_traces(&body)).await.unwrap();
        statuses.push(response.status());
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            assert_eq!(response.headers()["x-ratelimit-limit"], "10");
            assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
            assert!(response.headers().contains_key("retry-after"));
        }
    }

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 10);
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::TOO_MANY_REQUESTS).count(),
        2
    );

    // Health and metrics bypass the limiter
    for uri in ["/v1/health", "/metrics"] {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn test_disabled_rate_limit_passes_everything() {
    let writer = connected_writer().await;
    let app = app(writer, TokenBucketRateLimiter::new(1.0, 10, false));
    let body = export_body(vec![]);

    for _ in 0..20 {
        let response = app.clone().oneshot(post_traces(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health_when_connected() {
    let writer = connected_writer().await;
    let app = app(writer, TokenBucketRateLimiter::new(100.0, 200, true));

    let response = app
        .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["db_connected"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
