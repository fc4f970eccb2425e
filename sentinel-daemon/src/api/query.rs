//! Read endpoints over the event and replay-line stores.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use sentinel_core::event::{EventSource, StoredEvent, format_timestamp, parse_timestamp};
use sentinel_store::replay::DEFAULT_RANGE_LIMIT;
use sentinel_store::{MetricsReport, MetricsSnapshot, RangeSummary, clamp_limit};

use crate::api::error::ApiError;
use crate::api::state::AppState;

/// Page size when `limit` is omitted.
pub const DEFAULT_EVENTS_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct EventsParams {
    pub limit: Option<usize>,
    pub before_id: Option<i64>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<StoredEvent>,
}

/// `GET /api/events`
///
/// Without `source` this is the cursor page (`before_id`); with `source`
/// it lists that source's most recent events.
pub async fn events(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Result<Json<EventsResponse>, ApiError> {
    let limit = clamp_limit(
        params.limit.unwrap_or(DEFAULT_EVENTS_LIMIT),
        state.limits.max_page_size,
    );

    let events = match params.source {
        Some(source) => {
            let source: EventSource = source
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("unknown source '{source}'")))?;
            if params.before_id.is_some() {
                return Err(ApiError::BadRequest(
                    "before_id cannot be combined with source".to_owned(),
                ));
            }
            state
                .read_events(move |store| store.query_by_source(source, limit))
                .await?
        }
        None => {
            let before_id = params.before_id;
            state
                .read_events(move |store| store.query_page(limit, before_id))
                .await?
        }
    };
    Ok(Json(EventsResponse { events }))
}

/// `GET /api/metrics`
///
/// Never fails: an unreadable store renders every field as `"n/a"`.
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsReport> {
    match state.read_events(MetricsSnapshot::compute).await {
        Ok(snapshot) => Json(snapshot.report()),
        Err(e) => {
            tracing::warn!(error = %e, "metrics unavailable");
            Json(MetricsReport::unavailable())
        }
    }
}

/// `GET /api/replay/range`
pub async fn replay_range(State(state): State<AppState>) -> Result<Json<RangeSummary>, ApiError> {
    let summary = state.read_replay(|store| store.range_summary()).await?;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplayParams {
    pub start: Option<String>,
    pub end: Option<String>,
    /// Kept as text: a non-numeric limit falls back to the default.
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRow {
    pub ts: String,
    pub line: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplayResponse {
    pub rows: Vec<ReplayRow>,
}

/// `GET /api/replay/query`
pub async fn replay_query(
    State(state): State<AppState>,
    Query(params): Query<ReplayParams>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let start = time_bound("start", params.start.as_deref())?;
    let end = time_bound("end", params.end.as_deref())?;
    if let (Some(start), Some(end)) = (&start, &end) {
        if start > end {
            return Err(ApiError::BadRequest("start is after end".to_owned()));
        }
    }
    let limit = replay_limit(params.limit.as_deref(), state.limits.max_page_size);

    let lines = state
        .read_replay(move |store| store.query_range(start.as_ref(), end.as_ref(), limit))
        .await?;
    let rows = lines
        .into_iter()
        .map(|line| ReplayRow {
            ts: format_timestamp(&line.ts),
            line: line.line,
        })
        .collect();
    Ok(Json(ReplayResponse { rows }))
}

fn time_bound(
    name: &str,
    value: Option<&str>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_timestamp(raw)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("{name} is not an ISO timestamp: {raw}"))),
    }
}

fn replay_limit(raw: Option<&str>, max: usize) -> usize {
    let requested = raw
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_RANGE_LIMIT as i64);
    clamp_limit(requested.max(0) as usize, max)
}
