use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for every request handler. Validation and not-found are
/// normal outcomes surfaced with their own message; store failures are
/// logged server-side and answered with a generic message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Internal server error")]
    Database(#[from] rusqlite::Error),

    #[error("Internal server error")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error")]
    LockPoisoned,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(err) => {
                tracing::error!("database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::LockPoisoned => {
                tracing::error!("database lock poisoned");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
