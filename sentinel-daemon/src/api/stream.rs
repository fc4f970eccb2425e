//! Session index and the two streaming endpoints.
//!
//! Streaming bodies end when the client disconnects (the stream is dropped,
//! which stops the replay process or upstream reader) or when the daemon
//! begins shutting down.

use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Serialize;

use sentinel_log_pipeline::SessionSummary;
use sentinel_log_pipeline::sessions::list_sessions;

use crate::api::error::ApiError;
use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

/// `GET /api/sessions`
pub async fn sessions(State(state): State<AppState>) -> Result<Json<SessionsResponse>, ApiError> {
    let sessions = list_sessions(&state.sessions).await?;
    Ok(Json(SessionsResponse { sessions }))
}

/// `GET /api/sessions/{id}/replay`
pub async fn session_replay(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let transcript = state.replayer.open(&id).await?;
    tracing::info!(session = %id, "session replay started");

    let body = streaming_body(transcript, &state);
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

/// `GET /api/live`
pub async fn live(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(relay) = state.relay.as_ref() else {
        return Err(ApiError::Unavailable("live relay is disabled".to_owned()));
    };
    let frames = relay.subscribe(state.writer.clone()).await?;

    let body = streaming_body(frames, &state);
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

fn streaming_body<S>(stream: S, state: &AppState) -> Body
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let stream = stream
        .take_until(state.streams_closed())
        .map(Ok::<_, Infallible>);
    Body::from_stream(stream)
}
