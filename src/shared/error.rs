//! Application Error Types
//!
//! Centralized error handling with Axum integration, plus the error taxonomy
//! of the real-time synchronization protocol.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::ConnectionId;

/// HTTP-facing application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, 10001, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, 10002, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 10003, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, 10007, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, 10008, "Message store unavailable".into())
            }
        };

        (status, Json(ErrorResponse { code, message })).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

/// Durable message store failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Identity provider failures
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    Expired,
}

/// Which terminal rejection a submission ended in.
///
/// Sent to the submitting client so it can tell a retryable storage outage
/// apart from a submission that will never be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Persistence,
}

/// Synchronization protocol error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Malformed, oversized or unauthorized submission. Never persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Storage unavailable or write failure. The client may retry.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Fan-out target vanished. Skipped, never surfaced to the sender.
    #[error("connection {0} is gone")]
    Delivery(ConnectionId),

    /// Malformed or out-of-sequence event. Logged and dropped.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Rejection kind reported to a submitter, if this error is one.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            SyncError::Validation(_) => Some(FailureKind::Validation),
            SyncError::Persistence(_) => Some(FailureKind::Persistence),
            SyncError::Delivery(_) | SyncError::Protocol(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Persistence(_))
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        SyncError::Persistence(err.to_string())
    }
}
