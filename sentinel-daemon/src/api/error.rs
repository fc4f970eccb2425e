//! API error types and response formatting.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use sentinel_log_pipeline::LogPipelineError;
use sentinel_store::StoreError;

/// API error type that converts to an HTTP response with a JSON body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid request parameters or body.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request body carries more items than allowed.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// A required component is disabled or missing.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The upstream live feed could not be reached.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Store read failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Anything else (task join failures, writer gone).
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl From<LogPipelineError> for ApiError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::InvalidSessionId(_) => Self::BadRequest(err.to_string()),
            LogPipelineError::SessionArtifactMissing(_) => Self::NotFound(err.to_string()),
            LogPipelineError::ReplayToolMissing(_) => Self::Unavailable(err.to_string()),
            LogPipelineError::Upstream(_) => Self::Upstream(err.to_string()),
            LogPipelineError::Store(e) => Self::Store(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            Self::Upstream(e) => {
                tracing::warn!(error = %e, "live feed upstream unavailable");
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            Self::Store(e) => {
                tracing::error!(error = %e, "store read failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let message = match self {
            Self::Store(_) | Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        };
        let body = ErrorResponse { error, message };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_rejections_map_to_client_errors() {
        let cases = [
            (
                LogPipelineError::InvalidSessionId("../etc".to_owned()),
                StatusCode::BAD_REQUEST,
            ),
            (
                LogPipelineError::SessionArtifactMissing("abc".to_owned()),
                StatusCode::NOT_FOUND,
            ),
            (
                LogPipelineError::ReplayToolMissing("bin/playlog".to_owned()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            assert!(err.is_boundary_rejection());
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn channel_failure_is_internal() {
        let response =
            ApiError::from(LogPipelineError::Channel("writer closed".to_owned())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
