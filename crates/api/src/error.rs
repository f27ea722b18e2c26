use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use genjob_core::error::CoreError;
use genjob_engine::ServiceError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`ServiceError`]. Implements [`IntoResponse`] to
/// produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `genjob_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job registry error from `genjob_engine`.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
            },

            // --- ServiceError variants ---
            AppError::Service(service) => match service {
                ServiceError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", service.to_string())
                }
                ServiceError::AlreadyFinished { .. } => {
                    (StatusCode::CONFLICT, "CONFLICT", service.to_string())
                }
                ServiceError::UnknownProvider(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", service.to_string())
                }
            },
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
