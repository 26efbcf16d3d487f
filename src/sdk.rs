//! Client instrumentation handle
//!
//! ```ignore
//! let hikari = Instrumentor::init(ExporterConfig::default())?;
//! let ctx = PipelineContext::new("invoice-42").with_stage("extraction");
//! hikari.record_call(&ctx, call).await;
//! hikari.shutdown().await;
//! ```

use crate::attributes;
use crate::context::PipelineContext;
use crate::exporter::{ExportError, ExporterConfig, HttpTransport, SpanExporter, Transport};
use crate::otlp::{KeyValue, OtlpSpan};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One completed LLM call as observed by the caller
#[derive(Debug, Clone)]
pub struct LlmCall {
    /// Operation name, e.g. `openai.chat.completions.create`; also the
    /// default stage when the context has none
    pub operation: String,
    pub provider: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
    pub cost_input: Option<f64>,
    pub cost_output: Option<f64>,
    pub cost_total: Option<f64>,
}

/// Owns the exporter for the lifetime of the instrumented application
pub struct Instrumentor<T: Transport = HttpTransport> {
    exporter: SpanExporter<T>,
}

impl Instrumentor<HttpTransport> {
    pub fn init(config: ExporterConfig) -> Result<Self, ExportError> {
        tracing::debug!(endpoint = %config.endpoint, "Initializing hikari instrumentor");
        Ok(Self {
            exporter: SpanExporter::new(config)?,
        })
    }
}

impl<T: Transport> Instrumentor<T> {
    pub fn exporter(&self) -> &SpanExporter<T> {
        &self.exporter
    }

    /// Build a cost span for `call` and queue it; never fails
    pub async fn record_call(&self, ctx: &PipelineContext, call: LlmCall) {
        self.exporter.enqueue(vec![build_span(ctx, call)]).await;
    }

    /// Flush outstanding spans and stop the exporter
    pub async fn shutdown(&self) {
        self.exporter.shutdown().await;
    }
}

fn unix_nanos(ts: &DateTime<Utc>) -> String {
    ts.timestamp_nanos_opt().unwrap_or(0).to_string()
}

pub fn build_span(ctx: &PipelineContext, call: LlmCall) -> OtlpSpan {
    let stage = ctx.stage().unwrap_or(&call.operation).to_string();

    let mut attrs = vec![
        KeyValue::new(attributes::PIPELINE_ID, ctx.pipeline_id()),
        KeyValue::new(attributes::STAGE, stage),
        KeyValue::new(attributes::MODEL, call.model),
        KeyValue::new(attributes::PROVIDER, call.provider),
    ];

    let ints = [
        (attributes::TOKENS_INPUT, call.tokens_input),
        (attributes::TOKENS_OUTPUT, call.tokens_output),
    ];
    attrs.extend(
        ints.into_iter()
            .filter_map(|(key, v)| v.map(|v| KeyValue::new(key, v))),
    );

    let floats = [
        (attributes::COST_INPUT, call.cost_input),
        (attributes::COST_OUTPUT, call.cost_output),
        (attributes::COST_TOTAL, call.cost_total),
    ];
    attrs.extend(
        floats.into_iter()
            .filter_map(|(key, v)| v.map(|v| KeyValue::new(key, v))),
    );

    OtlpSpan {
        trace_id: Uuid::new_v4().simple().to_string(),
        span_id: Uuid::new_v4().simple().to_string()[..16].to_string(),
        name: call.operation,
        start_time_unix_nano: unix_nanos(&call.started_at),
        end_time_unix_nano: unix_nanos(&call.ended_at),
        attributes: attrs,
    }
}
