use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;

use crate::services::{AuthError, ChatError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    ValidationError(String),

    /// Daily message quota is spent; carries the limit for the response.
    QuotaExceeded(i32),

    /// The task queue refused the message; nothing was persisted.
    ServiceUnavailable(String),

    InternalError(String),

    Unauthorized(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::QuotaExceeded(limit) => write!(f, "Daily limit of {} reached", limit),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::QuotaExceeded(limit) => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Daily message limit of {limit} reached"),
            ),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::ChatroomNotFound => ApiError::NotFound("Chatroom not found".to_string()),
            ChatError::QuotaExceeded { limit } => ApiError::QuotaExceeded(limit),
            ChatError::QueueUnavailable => ApiError::ServiceUnavailable(
                "Message processing is temporarily unavailable".to_string(),
            ),
            ChatError::Validation(msg) => ApiError::ValidationError(msg),
            ChatError::Database(msg) => ApiError::DatabaseError(msg),
            ChatError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCode => {
                ApiError::Unauthorized("Invalid or expired verification code".to_string())
            }
            AuthError::Validation(msg) => ApiError::ValidationError(msg),
            AuthError::Database(msg) => ApiError::DatabaseError(msg),
            AuthError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::InternalError(msg.into())
    }
}
