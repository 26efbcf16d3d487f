use serde::{Deserialize, Serialize};

/// A parsed, validated cost span ready for persistence
///
/// Owned by exactly one holder at a time: the ingest handler, then the
/// writer buffer or an in-flight insert batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub span_name: String,
    /// Unix nanoseconds
    pub start_time_unix_nano: i64,
    /// Unix nanoseconds
    pub end_time_unix_nano: i64,
    pub pipeline_id: String,
    pub stage: String,
    pub model: String,
    pub provider: String,
    pub tokens_input: Option<i64>,
    pub tokens_output: Option<i64>,
    pub cost_input: Option<f64>,
    pub cost_output: Option<f64>,
    pub cost_total: Option<f64>,
}

impl SpanRecord {
    /// Row timestamp (span start); half of the upsert key together with `span_id`
    pub fn time(&self) -> i64 {
        self.start_time_unix_nano
    }

    pub fn duration_ms(&self) -> f64 {
        (self.end_time_unix_nano - self.start_time_unix_nano) as f64 / 1_000_000.0
    }
}

#[cfg(test)]
pub(crate) fn sample_record(span_id: &str, start_ns: i64) -> SpanRecord {
    SpanRecord {
        trace_id: "trace-1".to_string(),
        span_id: span_id.to_string(),
        span_name: "openai.chat.completions".to_string(),
        start_time_unix_nano: start_ns,
        end_time_unix_nano: start_ns + 250_000_000,
        pipeline_id: "pipeline-1".to_string(),
        stage: "extraction".to_string(),
        model: "gpt-4o".to_string(),
        provider: "openai".to_string(),
        tokens_input: Some(120),
        tokens_output: Some(40),
        cost_input: Some(0.0003),
        cost_output: Some(0.0004),
        cost_total: Some(0.0007),
    }
}
