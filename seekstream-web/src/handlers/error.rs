//! JSON error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use seekstream_core::SeekstreamError;
use seekstream_core::session::SessionError;
use seekstream_core::streaming::StreamError;
use serde_json::json;
use thiserror::Error;

/// Handler failures, rendered as `{"error": <message>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{reason}")]
    BadRequest { reason: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("download of {what} stopped before the file was complete")]
    Incomplete { what: String },

    #[error(transparent)]
    Core(#[from] SeekstreamError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Incomplete { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Core(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            ApiError::Core(SeekstreamError::Session(SessionError::Stream(
                StreamError::MetadataTimeout { .. } | StreamError::PieceTimeout { .. },
            ))) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        ApiError::Core(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Core(e) if e.is_user_error() => e.user_message(),
            ApiError::Core(SeekstreamError::Session(e)) => e.to_string(),
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}
