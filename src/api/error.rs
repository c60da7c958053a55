use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use tracing::error;

use crate::rewards::{ActionResult, RewardsError};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorResponse {
    #[serde(flatten)]
    envelope: ActionResult<()>,
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            envelope: ActionResult::failed(message),
            error: error_type,
        });

        (status, body).into_response()
    }
}

impl From<RewardsError> for ApiError {
    fn from(err: RewardsError) -> Self {
        match err {
            RewardsError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RewardsError::DuplicateReferral => ApiError::Conflict(err.to_string()),
            RewardsError::Persistence(msg) => ApiError::Internal(msg),
            RewardsError::NotEligible(_)
            | RewardsError::InsufficientBalance { .. }
            | RewardsError::BelowMinimumRedeemable { .. }
            | RewardsError::ExceedsTierCap { .. }
            | RewardsError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
