//! Custom error types for the marketplace service

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use common::error::DatabaseError;

/// Error taxonomy shared by services, the store and the HTTP layer
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or missing input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing or invalid credential
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated but not entitled
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity exists but the operation is illegal in its current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Duplicate submission
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unexpected failure
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(DatabaseError::Query(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::Validation(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::InvalidState(msg)
            | ApiError::Conflict(msg) => msg,
            ApiError::Internal(ref detail) => {
                error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            ApiError::Database(ref err) => {
                error!("Database error: {}", err);
                "Database error".to_string()
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
