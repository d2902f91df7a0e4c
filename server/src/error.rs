//! Mapping backend failures onto HTTP responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use rallyd_engine::RallyError;

/// Error returned by every handler, rendered as `{"error": {"code", "message"}}`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }
}

impl From<RallyError> for ApiError {
    fn from(err: RallyError) -> Self {
        let (status, code) = match &err {
            RallyError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            RallyError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "invalid_input"),
            // Clients treat this as a server-side precondition, not a bad request.
            RallyError::TempestNotInstalled { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "tempest_not_installed")
            }
            RallyError::CommandFailed { .. } | RallyError::UnexpectedOutput { .. } => {
                (StatusCode::BAD_GATEWAY, "command_failed")
            }
            RallyError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            RallyError::Spawn { .. } | RallyError::Io { .. } | RallyError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        Self::new(status, code, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), code = self.code, "{}", self.message);
        } else {
            tracing::debug!(status = self.status.as_u16(), code = self.code, "{}", self.message);
        }
        let body = Json(json!({
            "error": {"code": self.code, "message": self.message}
        }));
        (self.status, body).into_response()
    }
}
