use crate::error::AppError;
use crate::ingest;
use crate::otlp::{ExportTraceRequest, IngestResponse};
use crate::storage::SpanWriter;
use axum::{extract::rejection::JsonRejection, extract::State, Json};

/// Handle POST /v1/traces
///
/// Valid spans are handed to the writer, which either persists or buffers
/// them; invalid spans are reported per span. Database state never changes
/// the response.
pub async fn ingest_traces(
    State(writer): State<SpanWriter>,
    payload: Result<Json<ExportTraceRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let parsed = ingest::parse_request(&request);
    let accepted = parsed.records.len();
    let rejected = parsed.errors.len();

    if accepted > 0 {
        writer.write(parsed.records).await;
    }

    crate::metrics::record_spans_accepted(accepted as u64);
    if rejected > 0 {
        crate::metrics::record_spans_rejected(rejected as u64);
    }

    tracing::debug!(accepted = accepted, rejected = rejected, "Ingested trace batch");

    Ok(Json(IngestResponse {
        accepted,
        rejected,
        errors: parsed.errors,
    }))
}
