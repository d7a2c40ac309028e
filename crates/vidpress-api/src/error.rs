//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vidpress_models::ErrorKind;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::NotFound(_) => ErrorKind::FileNotFound,
            ApiError::BadRequest(_) | ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Conflict(_) => ErrorKind::Validation,
            ApiError::RateLimited => ErrorKind::RateLimited,
            ApiError::BrokerUnavailable(_) => ErrorKind::BrokerUnavailable,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<vidpress_queue::QueueError> for ApiError {
    fn from(e: vidpress_queue::QueueError) -> Self {
        use vidpress_queue::QueueError;
        match e {
            QueueError::AlreadyQueued(post_id) => {
                Self::Conflict(format!("a job for post {} is already queued", post_id))
            }
            QueueError::JobNotFound(id) => Self::NotFound(format!("job {}", id)),
            e if e.is_connection() => Self::BrokerUnavailable(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

/// Error body: `{status, message, code}`.
#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
    code: ErrorKind,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            status: "error",
            message: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}
