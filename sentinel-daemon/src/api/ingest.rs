//! Intake endpoint: `POST /api/ingest`.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sentinel_core::metrics::API_INTAKE_REJECTED_TOTAL;
use sentinel_log_pipeline::coerce_intake;

use crate::api::error::ApiError;
use crate::api::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IngestParams {
    /// Wait until the accepted events are committed.
    #[serde(default)]
    pub sync: bool,
}

/// Per-request intake outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub dropped: usize,
}

/// Coerce each item and hand it to the writer.
///
/// Unrecognisable items are rejected one by one; the rest of the batch
/// still goes through. A full writer queue drops items without failing the
/// request.
pub async fn ingest(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
    Json(body): Json<Value>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Value::Array(items) = body else {
        return Err(ApiError::BadRequest(
            "expected a JSON array of events".to_owned(),
        ));
    };
    if items.len() > state.limits.max_intake_batch {
        return Err(ApiError::PayloadTooLarge(format!(
            "{} events exceeds the limit of {}",
            items.len(),
            state.limits.max_intake_batch
        )));
    }

    let mut outcome = IngestResponse::default();
    for (index, item) in items.iter().enumerate() {
        match coerce_intake(item) {
            Ok(event) => {
                if state.writer.submit_event(event) {
                    outcome.accepted += 1;
                } else {
                    outcome.dropped += 1;
                }
            }
            Err(reason) => {
                tracing::debug!(index, reason = %reason, "intake item rejected");
                outcome.rejected += 1;
            }
        }
    }
    if outcome.rejected > 0 {
        metrics::counter!(API_INTAKE_REJECTED_TOTAL).increment(outcome.rejected as u64);
    }

    if params.sync && outcome.accepted > 0 {
        state.writer.flush().await?;
    }

    tracing::debug!(
        accepted = outcome.accepted,
        rejected = outcome.rejected,
        dropped = outcome.dropped,
        "intake batch processed"
    );
    Ok(Json(outcome))
}
