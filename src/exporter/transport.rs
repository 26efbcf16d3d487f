//! Batch transport for the span exporter

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// A failed export attempt
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("collector responded with status {0}")]
    Status(u16),
    #[error("failed to serialize batch: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ExportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Delivers one serialized batch to the collector
///
/// Any `Err` counts as a failed attempt; retry policy lives in the exporter.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, body: Vec<u8>) -> Result<(), ExportError>;
}

/// JSON over HTTP to `{endpoint}/v1/traces`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ExportError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: format!("{}/v1/traces", endpoint.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, body: Vec<u8>) -> Result<(), ExportError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Status(status.as_u16()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_url_joins_endpoint() {
        let transport = HttpTransport::new("http://collector:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.url(), "http://collector:8000/v1/traces");
    }

    #[tokio::test]
    async fn test_send_posts_json() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/traces")
                    .header("content-type", "application/json")
                    .body(r#"{"resourceSpans":[]}"#);
                then.status(200).body(r#"{"accepted":0}"#);
            })
            .await;

        let transport = HttpTransport::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let result = transport.send(br#"{"resourceSpans":[]}"#.to_vec()).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/traces");
                then.status(503);
            })
            .await;

        let transport = HttpTransport::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let result = transport.send(b"{}".to_vec()).await;

        assert!(matches!(result, Err(ExportError::Status(503))));
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_transport_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let result = transport.send(b"{}".to_vec()).await;

        assert!(matches!(result, Err(ExportError::Transport(_))));
    }
}
