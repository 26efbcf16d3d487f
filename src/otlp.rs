//! OTLP-shaped JSON wire format
//!
//! Shared by the client exporter (serialization) and the ingestion endpoint
//! (deserialization). Only the subset of OTLP/JSON that carries hikari cost
//! spans is modeled: `resourceSpans[].scopeSpans[].spans[]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Request body of `POST /v1/traces`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceRequest {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    #[serde(default)]
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeSpans {
    #[serde(default)]
    pub spans: Vec<OtlpSpan>,
}

/// One span as it travels on the wire
///
/// Timestamps are decimal strings of Unix nanoseconds, per OTLP/JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpan {
    pub trace_id: String,
    pub span_id: String,
    pub name: String,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<AnyValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Attribute value, one variant per scalar OTLP value kind
///
/// Serializes as `{"stringValue": ..}`, `{"intValue": ".."}`,
/// `{"doubleValue": ..}` or `{"boolValue": ..}`. Any other kind
/// (`arrayValue`, `kvlistValue`, `bytesValue`) is kept verbatim as
/// `Unsupported` so one exotic attribute does not reject the whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnyValue {
    StringValue(String),
    IntValue(#[serde(with = "int64_as_string")] i64),
    DoubleValue(f64),
    BoolValue(bool),
    #[serde(untagged)]
    Unsupported(serde_json::Value),
}

impl AnyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::StringValue(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; strings and integral doubles are coerced
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::IntValue(v) => Some(*v),
            Self::DoubleValue(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::StringValue(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view; integers and numeric strings are coerced
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::DoubleValue(v) => Some(*v),
            Self::IntValue(v) => Some(*v as f64),
            Self::StringValue(s) => s.trim().parse().ok(),
            Self::BoolValue(_) | Self::Unsupported(_) => None,
        }
    }

    /// Text rendering used for string-typed attributes
    pub fn to_text(&self) -> String {
        match self {
            Self::StringValue(s) => s.clone(),
            Self::IntValue(v) => v.to_string(),
            Self::DoubleValue(v) => v.to_string(),
            Self::BoolValue(v) => v.to_string(),
            Self::Unsupported(v) => v.to_string(),
        }
    }
}

impl From<&str> for AnyValue {
    fn from(v: &str) -> Self {
        Self::StringValue(v.to_string())
    }
}

impl From<String> for AnyValue {
    fn from(v: String) -> Self {
        Self::StringValue(v)
    }
}

impl From<i64> for AnyValue {
    fn from(v: i64) -> Self {
        Self::IntValue(v)
    }
}

impl From<u64> for AnyValue {
    fn from(v: u64) -> Self {
        Self::IntValue(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AnyValue {
    fn from(v: f64) -> Self {
        Self::DoubleValue(v)
    }
}

impl From<bool> for AnyValue {
    fn from(v: bool) -> Self {
        Self::BoolValue(v)
    }
}

/// OTLP/JSON encodes int64 as a decimal string; accept bare numbers too
mod int64_as_string {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntRepr {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match IntRepr::deserialize(deserializer)? {
            IntRepr::Number(n) => Ok(n),
            IntRepr::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}

impl ExportTraceRequest {
    /// Wrap spans in a single resource/scope envelope
    pub fn from_spans(spans: Vec<OtlpSpan>) -> Self {
        Self {
            resource_spans: vec![ResourceSpans {
                scope_spans: vec![ScopeSpans { spans }],
            }],
        }
    }

    /// All spans across every resource and scope, in document order
    pub fn spans(&self) -> impl Iterator<Item = &OtlpSpan> {
        self.resource_spans
            .iter()
            .flat_map(|r| r.scope_spans.iter())
            .flat_map(|s| s.spans.iter())
    }
}

/// Response body of `POST /v1/traces`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
    #[serde(default)]
    pub rejected: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_any_value_wire_shape() {
        let attrs = vec![
            KeyValue::new("s", "text"),
            KeyValue::new("i", 42i64),
            KeyValue::new("d", 0.5),
            KeyValue::new("b", true),
        ];
        let value = serde_json::to_value(&attrs).unwrap();

        assert_eq!(
            value,
            json!([
                {"key": "s", "value": {"stringValue": "text"}},
                {"key": "i", "value": {"intValue": "42"}},
                {"key": "d", "value": {"doubleValue": 0.5}},
                {"key": "b", "value": {"boolValue": true}},
            ])
        );
    }

    #[test]
    fn test_int_value_accepts_number_or_string() {
        let a: AnyValue = serde_json::from_value(json!({"intValue": "7"})).unwrap();
        let b: AnyValue = serde_json::from_value(json!({"intValue": 7})).unwrap();
        assert_eq!(a, AnyValue::IntValue(7));
        assert_eq!(b, AnyValue::IntValue(7));
    }

    #[test]
    fn test_request_parses_nested_spans() {
        let body = json!({
            "resourceSpans": [{
                "scopeSpans": [{
                    "spans": [{
                        "traceId": "t1",
                        "spanId": "s1",
                        "name": "openai.chat",
                        "startTimeUnixNano": "1700000000000000000",
                        "endTimeUnixNano": "1700000001000000000",
                        "attributes": [{"key": "hikari.stage", "value": {"stringValue": "extract"}}]
                    }]
                }]
            }, {
                "scopeSpans": []
            }]
        });

        let req: ExportTraceRequest = serde_json::from_value(body).unwrap();
        let spans: Vec<_> = req.spans().collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_id, "s1");
        assert_eq!(spans[0].attributes[0].value.as_str(), Some("extract"));
    }

    #[test]
    fn test_non_scalar_values_are_kept_verbatim() {
        let body = json!({
            "resourceSpans": [{
                "scopeSpans": [{
                    "spans": [{
                        "traceId": "t1",
                        "spanId": "s1",
                        "name": "openai.chat",
                        "startTimeUnixNano": "1700000000000000000",
                        "endTimeUnixNano": "1700000001000000000",
                        "attributes": [
                            {"key": "tags", "value": {"arrayValue": {"values": [{"stringValue": "a"}]}}},
                            {"key": "raw", "value": {"bytesValue": "AAE="}}
                        ]
                    }]
                }]
            }]
        });

        let req: ExportTraceRequest = serde_json::from_value(body).unwrap();
        let span = req.spans().next().unwrap();
        let tags = &span.attributes[0].value;

        assert!(matches!(tags, AnyValue::Unsupported(_)));
        assert_eq!(tags.as_i64(), None);
        assert_eq!(tags.as_f64(), None);
        assert_eq!(tags.to_text(), r#"{"arrayValue":{"values":[{"stringValue":"a"}]}}"#);
        assert_eq!(
            serde_json::to_value(&span.attributes[1].value).unwrap(),
            json!({"bytesValue": "AAE="})
        );
    }

    #[test]
    fn test_numeric_coercions() {
        assert_eq!(AnyValue::StringValue("12".into()).as_i64(), Some(12));
        assert_eq!(AnyValue::DoubleValue(3.0).as_i64(), Some(3));
        assert_eq!(AnyValue::DoubleValue(3.5).as_i64(), None);
        assert_eq!(AnyValue::IntValue(2).as_f64(), Some(2.0));
        assert_eq!(AnyValue::BoolValue(true).as_f64(), None);
    }
}
