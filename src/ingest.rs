//! OTLP request → validated [`SpanRecord`]s
//!
//! Each span is validated on its own; a bad span is reported as
//! `"Span <id>: <reason>"` and never affects its neighbours.

use crate::attributes;
use crate::otlp::{AnyValue, ExportTraceRequest, OtlpSpan};
use crate::storage::SpanRecord;
use std::collections::HashMap;

/// 2020-01-01T00:00:00Z
pub const MIN_TIMESTAMP_NS: i64 = 1_577_836_800_000_000_000;
pub const MAX_FUTURE_DAYS: i64 = 365;
pub const MAX_SPAN_DURATION_NS: i64 = 24 * 60 * 60 * 1_000_000_000;

const MAX_ID_LEN: usize = 64;
const MAX_NAME_LEN: usize = 256;
const NANOS_PER_DAY: i64 = 86_400 * 1_000_000_000;

/// Outcome of parsing one ingestion request
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub records: Vec<SpanRecord>,
    pub errors: Vec<String>,
}

/// Parse and validate every span in the request against the current time
pub fn parse_request(request: &ExportTraceRequest) -> ParsedBatch {
    let now_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    parse_request_at(request, now_ns)
}

pub fn parse_request_at(request: &ExportTraceRequest, now_ns: i64) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    let max_ts = now_ns.saturating_add(MAX_FUTURE_DAYS * NANOS_PER_DAY);

    for span in request.spans() {
        match parse_span(span, max_ts) {
            Ok(record) => batch.records.push(record),
            Err(reason) => {
                tracing::warn!(span_id = %span.span_id, reason = %reason, "Span rejected");
                batch.errors.push(format!("Span {}: {}", span.span_id, reason));
            }
        }
    }

    batch
}

fn parse_span(span: &OtlpSpan, max_ts: i64) -> Result<SpanRecord, String> {
    validate_id("traceId", &span.trace_id)?;
    validate_id("spanId", &span.span_id)?;
    if span.name.is_empty() || span.name.chars().count() > MAX_NAME_LEN {
        return Err(format!("name must be 1-{} characters", MAX_NAME_LEN));
    }

    // Later duplicates of a key win
    let attrs: HashMap<&str, &AnyValue> = span
        .attributes
        .iter()
        .map(|kv| (kv.key.as_str(), &kv.value))
        .collect();

    let mut missing: Vec<&str> = attributes::REQUIRED
        .iter()
        .copied()
        .filter(|key| !attrs.contains_key(key))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(format!("Missing required attributes: {}", missing.join(", ")));
    }

    let text = |key: &str| attrs.get(key).map(|v| v.to_text());

    let start_ns = parse_timestamp("startTimeUnixNano", &span.start_time_unix_nano, max_ts)?;
    let end_ns = parse_timestamp("endTimeUnixNano", &span.end_time_unix_nano, max_ts)?;

    if end_ns < start_ns {
        return Err(format!(
            "endTimeUnixNano ({}) must be >= startTimeUnixNano ({})",
            end_ns, start_ns
        ));
    }
    let duration_ns = end_ns - start_ns;
    if duration_ns > MAX_SPAN_DURATION_NS {
        return Err(format!(
            "Span duration ({:.2}s) exceeds maximum allowed duration ({}s)",
            duration_ns as f64 / 1e9,
            MAX_SPAN_DURATION_NS / 1_000_000_000
        ));
    }

    Ok(SpanRecord {
        trace_id: span.trace_id.clone(),
        span_id: span.span_id.clone(),
        span_name: span.name.clone(),
        start_time_unix_nano: start_ns,
        end_time_unix_nano: end_ns,
        pipeline_id: text(attributes::PIPELINE_ID).unwrap_or_else(|| span.trace_id.clone()),
        stage: text(attributes::STAGE).unwrap_or_default(),
        model: text(attributes::MODEL).unwrap_or_default(),
        provider: text(attributes::PROVIDER).unwrap_or_default(),
        tokens_input: int_attr(&attrs, attributes::TOKENS_INPUT)?,
        tokens_output: int_attr(&attrs, attributes::TOKENS_OUTPUT)?,
        cost_input: float_attr(&attrs, attributes::COST_INPUT)?,
        cost_output: float_attr(&attrs, attributes::COST_OUTPUT)?,
        cost_total: float_attr(&attrs, attributes::COST_TOTAL)?,
    })
}

fn validate_id(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() || value.len() > MAX_ID_LEN {
        return Err(format!("{} must be 1-{} characters", field, MAX_ID_LEN));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!(
            "{} must contain only alphanumeric characters, hyphens, and underscores",
            field
        ));
    }
    Ok(())
}

fn parse_timestamp(field: &str, value: &str, max_ts: i64) -> Result<i64, String> {
    let ts: i64 = value
        .trim()
        .parse()
        .map_err(|e| format!("{} must be a valid integer: {}", field, e))?;

    if ts < 0 {
        return Err(format!("{} cannot be negative", field));
    }
    if ts < MIN_TIMESTAMP_NS {
        return Err(format!(
            "{} is too old (before 2020-01-01). Value: {}, minimum: {}",
            field, ts, MIN_TIMESTAMP_NS
        ));
    }
    if ts > max_ts {
        return Err(format!(
            "{} is too far in the future (more than {} days). Value: {}, maximum: {}",
            field, MAX_FUTURE_DAYS, ts, max_ts
        ));
    }
    Ok(ts)
}

fn int_attr(attrs: &HashMap<&str, &AnyValue>, key: &str) -> Result<Option<i64>, String> {
    match attrs.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("{} must be an integer", key)),
    }
}

fn float_attr(attrs: &HashMap<&str, &AnyValue>, key: &str) -> Result<Option<f64>, String> {
    match attrs.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("{} must be a number", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otlp::KeyValue;

    const NOW: i64 = 1_760_000_000_000_000_000;

    fn span(span_id: &str) -> OtlpSpan {
        OtlpSpan {
            trace_id: "trace-abc".to_string(),
            span_id: span_id.to_string(),
            name: "anthropic.messages.create".to_string(),
            start_time_unix_nano: "1750000000000000000".to_string(),
            end_time_unix_nano: "1750000001500000000".to_string(),
            attributes: vec![
                KeyValue::new(attributes::STAGE, "summarize"),
                KeyValue::new(attributes::MODEL, "claude-sonnet"),
                KeyValue::new(attributes::PROVIDER, "anthropic"),
                KeyValue::new(attributes::TOKENS_INPUT, 500i64),
                KeyValue::new(attributes::TOKENS_OUTPUT, "80"),
                KeyValue::new(attributes::COST_TOTAL, 0.0021),
            ],
        }
    }

    fn parse(spans: Vec<OtlpSpan>) -> ParsedBatch {
        parse_request_at(&ExportTraceRequest::from_spans(spans), NOW)
    }

    #[test]
    fn test_valid_span_is_mapped() {
        let batch = parse(vec![span("s1")]);

        assert!(batch.errors.is_empty());
        let record = &batch.records[0];
        assert_eq!(record.pipeline_id, "trace-abc");
        assert_eq!(record.stage, "summarize");
        assert_eq!(record.tokens_input, Some(500));
        assert_eq!(record.tokens_output, Some(80));
        assert_eq!(record.cost_total, Some(0.0021));
        assert_eq!(record.cost_input, None);
        assert_eq!(record.duration_ms(), 1500.0);
    }

    #[test]
    fn test_explicit_pipeline_id_wins() {
        let mut s = span("s1");
        s.attributes.push(KeyValue::new(attributes::PIPELINE_ID, "pipe-9"));

        let batch = parse(vec![s]);
        assert_eq!(batch.records[0].pipeline_id, "pipe-9");
    }

    #[test]
    fn test_missing_attributes_rejects_only_that_span() {
        let mut bad = span("bad");
        bad.attributes.retain(|kv| kv.key != attributes::MODEL && kv.key != attributes::STAGE);

        let batch = parse(vec![span("good"), bad]);

        assert_eq!(batch.records.len(), 1);
        assert_eq!(
            batch.errors,
            vec!["Span bad: Missing required attributes: hikari.model, hikari.stage".to_string()]
        );
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let mut s = span("s1");
        s.end_time_unix_nano = "1749999999000000000".to_string();

        let batch = parse(vec![s]);
        assert!(batch.errors[0].starts_with("Span s1: endTimeUnixNano"));
    }

    #[test]
    fn test_timestamp_bounds() {
        let mut old = span("old");
        old.start_time_unix_nano = "1000".to_string();
        let mut future = span("future");
        future.end_time_unix_nano = (NOW + 400 * NANOS_PER_DAY).to_string();
        let mut garbage = span("garbage");
        garbage.start_time_unix_nano = "soon".to_string();

        let batch = parse(vec![old, future, garbage]);

        assert!(batch.records.is_empty());
        assert!(batch.errors[0].contains("too old"));
        assert!(batch.errors[1].contains("too far in the future"));
        assert!(batch.errors[2].contains("must be a valid integer"));
    }

    #[test]
    fn test_duration_limit() {
        let mut s = span("long");
        s.end_time_unix_nano = (1_750_000_000_000_000_000i64 + MAX_SPAN_DURATION_NS + 1).to_string();

        let batch = parse(vec![s]);
        assert!(batch.errors[0].contains("exceeds maximum allowed duration"));
    }

    #[test]
    fn test_id_format() {
        let mut s = span("s1");
        s.trace_id = "bad id!".to_string();
        let mut long = span(&"x".repeat(65));
        long.name = "ok".to_string();

        let batch = parse(vec![s, long]);
        assert_eq!(batch.errors.len(), 2);
        assert!(batch.errors[0].contains("traceId must contain only"));
        assert!(batch.errors[1].contains("spanId must be 1-64"));
    }

    #[test]
    fn test_non_numeric_tokens_rejected() {
        let mut s = span("s1");
        s.attributes.push(KeyValue::new(attributes::TOKENS_INPUT, "many"));

        let batch = parse(vec![s]);
        assert!(batch.errors[0].contains("hikari.tokens.input must be an integer"));
    }
}
