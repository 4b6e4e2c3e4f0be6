use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, AppError>;

/// Errors produced while decoding an inbound route or obstacle message (spec
/// §7 `MalformedInput`/`UnknownReference`). Planner and Resolver errors are
/// recovered locally inside the Supervisor's tick loop and never reach this
/// type — only the ingestion and telemetry boundaries produce `AppError`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("unknown reference: {0}")]
    UnknownReference(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::MalformedInput(e) => {
                tracing::error!("malformed input: {}", e);
                (StatusCode::BAD_REQUEST, e)
            }
            AppError::UnknownReference(e) => (StatusCode::UNPROCESSABLE_ENTITY, e),
            AppError::NotFound(e) => (StatusCode::NOT_FOUND, e),
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
