//! Domain error → HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::DomainError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Wrapper turning a [`DomainError`] into the status code its kind maps
/// to. Handlers return `Result<_, ApiError>` and use `?` throughout.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            DomainError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            DomainError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            DomainError::Gone(msg) => (StatusCode::GONE, msg.clone()),
            DomainError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            DomainError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            DomainError::Transient(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            DomainError::Fatal(msg) => {
                error!(error = %msg, "fatal error surfaced at HTTP edge");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            DomainError::Database(err) => {
                error!(error = %err, "database error surfaced at HTTP edge");
                (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
