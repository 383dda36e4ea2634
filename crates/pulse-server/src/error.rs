//! API error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pulse_core::{BridgeError, HubError};
use serde_json::json;
use thiserror::Error;

/// Errors returned by the HTTP handlers, rendered as `{error, code}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Registry misuse (duplicate id, unknown topic, missing connection).
    #[error(transparent)]
    Hub(#[from] HubError),
    /// Change source rejected or could not take a record.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// Request body or query failed validation.
    #[error("invalid request: {0}")]
    BadRequest(String),
    /// `/metrics` was hit but no recorder is installed.
    #[error("metrics recorder not installed")]
    MetricsUnavailable,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Hub(HubError::DuplicateConnectionId(_)) => StatusCode::CONFLICT,
            Self::Hub(HubError::ConnectionNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Hub(HubError::UnknownTopic(_))
            | Self::Bridge(BridgeError::MalformedChangeEvent(_))
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Bridge(_) => StatusCode::BAD_GATEWAY,
            Self::MetricsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Hub(HubError::DuplicateConnectionId(_)) => "DUPLICATE_CONNECTION",
            Self::Hub(HubError::ConnectionNotFound(_)) => "CONNECTION_NOT_FOUND",
            Self::Hub(HubError::UnknownTopic(_)) => "UNKNOWN_TOPIC",
            Self::Bridge(BridgeError::MalformedChangeEvent(_)) => "MALFORMED_CHANGE",
            Self::Bridge(_) => "CHANGE_SOURCE_UNAVAILABLE",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::MetricsUnavailable => "METRICS_UNAVAILABLE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string(), "code": self.code() });
        (self.status(), Json(body)).into_response()
    }
}
