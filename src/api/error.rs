//! API error handling.
//!
//! Handlers return `Result<_, ApiError>`; the error decides its own
//! status code and renders as `{"error": "..."}`. Config validation
//! failures surface as 400 with the validation message, everything else
//! that bubbles up from the library layers is a 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::config::ConfigError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A satellite call without the `X-Satellite-ID` header.
    #[error("missing satellite id")]
    MissingSatelliteId,

    /// A satellite call carrying an id that is not in the config.
    #[error("unknown satellite '{0}'")]
    UnknownSatellite(String),

    #[error("endpoint '{0}' not found")]
    EndpointNotFound(String),

    /// Malformed request parameters or payload.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingSatelliteId
            | ApiError::UnknownSatellite(_)
            | ApiError::BadRequest(_)
            | ApiError::Config(ConfigError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::EndpointNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Config(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
