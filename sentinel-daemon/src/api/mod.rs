//! HTTP API.
//!
//! # Routes
//!
//! - `POST /api/ingest` - push intake batch (`?sync=true` waits for commit)
//! - `GET /api/events` - cursor page (`limit`, `before_id`) or per-source list (`source`)
//! - `GET /api/metrics` - store aggregates, missing values as `"n/a"`
//! - `GET /api/replay/range` - replay-line time range
//! - `GET /api/replay/query` - replay lines between `start` and `end`
//! - `GET /api/sessions` - replayable SHELL sessions
//! - `GET /api/sessions/{id}/replay` - streamed session transcript
//! - `GET /api/live` - relayed live feed (`text/event-stream`)
//! - `GET /health` - component health

pub mod error;
pub mod ingest;
pub mod query;
pub mod state;
pub mod stream;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::Level;

pub use error::ApiError;
pub use state::{ApiLimits, AppState, SharedPipeline};

/// Intake bodies can be large; other routes keep axum's default limit.
const INTAKE_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Build the complete API router with request tracing.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/ingest",
            post(ingest::ingest).layer(DefaultBodyLimit::max(INTAKE_BODY_LIMIT)),
        )
        .route("/events", get(query::events))
        .route("/metrics", get(query::metrics))
        .route("/replay/range", get(query::replay_range))
        .route("/replay/query", get(query::replay_query))
        .route("/sessions", get(stream::sessions))
        .route("/sessions/{id}/replay", get(stream::session_replay))
        .route("/live", get(stream::live));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .with_state(state)
}

/// `GET /health`
///
/// 200 unless the daemon is unhealthy, so load balancers can poll it directly.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health().await;
    let status = if report.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}
