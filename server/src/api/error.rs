//! HTTP error type shared by all handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::policy::PolicyError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Admin token missing or invalid")]
    Unauthorized,

    #[error("Admin endpoints are disabled")]
    AdminDisabled,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Event queue is full")]
    QueueFull,

    #[error("Event queue is closed")]
    QueueClosed,

    #[error("{0}")]
    Policy(#[from] PolicyError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({"error": "unauthorized", "message": self.to_string()}),
            ),
            Self::AdminDisabled => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": "admin_disabled", "message": self.to_string()}),
            ),
            Self::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": "validation", "message": msg}),
            ),
            Self::QueueFull => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({"error": "queue_full", "message": self.to_string()}),
            ),
            Self::QueueClosed => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({"error": "shutting_down", "message": self.to_string()}),
            ),
            Self::Policy(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({"error": "invalid_policy", "message": e.to_string()}),
            ),
        };
        (status, Json(body)).into_response()
    }
}
