use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::usecases::sync_error::SyncError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("admin token is not configured")]
    AdminDisabled,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            AppError::AdminDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "admin_disabled",
                self.to_string(),
                None,
            ),
            AppError::Sync(SyncError::Validation(message)) => {
                (StatusCode::BAD_REQUEST, "validation_error", message, None)
            }
            AppError::Sync(SyncError::Unauthorized) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "unauthorized".to_string(),
                None,
            ),
            AppError::Sync(SyncError::Conflict { message, current }) => (
                StatusCode::CONFLICT,
                "conflict",
                message,
                Some(serde_json::json!({ "current": current, "hint": "retry with force=true" })),
            ),
            AppError::Sync(SyncError::NotFound { kind, id }) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{kind} not found"),
                Some(serde_json::json!({ "id": id })),
            ),
            AppError::Sync(SyncError::Upstream(err)) => {
                error!(error = ?err, "http: upstream call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "upstream call failed".to_string(),
                    Some(Value::String(format!("{err:#}"))),
                )
            }
            AppError::Sync(SyncError::Internal(err)) => {
                // Don't leak internal error detail to client
                error!(error = ?err, "http: internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            error,
            message,
            details,
        });

        (status, body).into_response()
    }
}
