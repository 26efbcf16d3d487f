//! Per-client token-bucket admission control for the ingestion endpoint
//!
//! Buckets refill lazily on each check, so no timer runs per client. Stale
//! buckets are removed by an explicit sweep (see [`spawn_sweep_task`]).

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Identity shared by every client without an address
pub const UNKNOWN_CLIENT: &str = "unknown";

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Result of one admission check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Bucket capacity (burst size)
    pub limit: u32,
    /// Whole tokens left after this check
    pub remaining: u32,
    /// Unix time (seconds) at which the bucket will be full again
    pub reset_epoch_secs: u64,
    /// Seconds until one token is available; set only on rejection
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    /// `X-RateLimit-*` headers, plus `Retry-After` on rejection
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: u64| {
            headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
        };

        put("x-ratelimit-limit", u64::from(self.limit));
        put("x-ratelimit-remaining", u64::from(self.remaining));
        put("x-ratelimit-reset", self.reset_epoch_secs);
        if let Some(retry_after) = self.retry_after_secs {
            put("retry-after", retry_after);
        }

        headers
    }
}

/// Token bucket per client identity
pub struct TokenBucketRateLimiter {
    rate: f64,
    burst: u32,
    enabled: bool,
    buckets: DashMap<String, BucketState>,
}

impl TokenBucketRateLimiter {
    /// `rate` tokens per second, up to `burst` tokens
    pub fn new(rate: f64, burst: u32, enabled: bool) -> Self {
        Self {
            rate: rate.max(f64::MIN_POSITIVE),
            burst: burst.max(1),
            enabled,
            buckets: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn check(&self, client_id: &str) -> RateLimitDecision {
        self.check_at(client_id, Instant::now())
    }

    pub fn check_at(&self, client_id: &str, now: Instant) -> RateLimitDecision {
        let burst = f64::from(self.burst);

        let (allowed, tokens) = {
            let mut bucket = self
                .buckets
                .entry(client_id.to_string())
                .or_insert(BucketState {
                    tokens: burst,
                    last_refill: now,
                });

            let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.rate).min(burst);
            bucket.last_refill = now;

            let allowed = bucket.tokens >= 1.0;
            if allowed {
                bucket.tokens -= 1.0;
            }
            (allowed, bucket.tokens)
        };

        let now_epoch = chrono::Utc::now().timestamp().max(0) as u64;
        let refill_secs = ((burst - tokens) / self.rate).max(0.0);

        RateLimitDecision {
            allowed,
            limit: self.burst,
            remaining: tokens.floor().max(0.0) as u32,
            reset_epoch_secs: now_epoch + refill_secs.ceil() as u64,
            retry_after_secs: (!allowed).then(|| ((1.0 - tokens) / self.rate).ceil() as u64),
        }
    }

    /// Drop buckets not touched within `max_age`; returns how many were removed
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        self.sweep_stale_at(max_age, Instant::now())
    }

    pub fn sweep_stale_at(&self, max_age: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) <= max_age);
        before.saturating_sub(self.buckets.len())
    }
}

/// Client identity: first `X-Forwarded-For` entry, then the peer address
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

/// Rate-limit middleware for routes that opt in via `route_layer`
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<TokenBucketRateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_id(req.headers(), peer);
    let decision = limiter.check(&client);

    if !decision.allowed {
        tracing::warn!(
            client = %client,
            retry_after_secs = decision.retry_after_secs.unwrap_or_default(),
            "Rate limit exceeded"
        );
        crate::metrics::record_rate_limited();

        let body = Json(json!({
            "error": {
                "message": "Rate limit exceeded",
                "type": "rate_limit_exceeded",
            }
        }));
        return (StatusCode::TOO_MANY_REQUESTS, decision.headers(), body).into_response();
    }

    let mut response = next.run(req).await;
    response.headers_mut().extend(decision.headers());
    response
}

/// Periodically remove buckets idle longer than `stale_after`
pub fn spawn_sweep_task(
    limiter: Arc<TokenBucketRateLimiter>,
    stale_after: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = limiter.sweep_stale(stale_after);
            if removed > 0 {
                tracing::debug!(
                    removed = removed,
                    remaining = limiter.bucket_count(),
                    "Swept stale rate-limit buckets"
                );
            }
        }
    })
}
