//! Error types for the elector and its storage port.
//!
//! [`StorageError`] is what a [`crate::storage::backend::RecordStorage`]
//! implementation reports; [`ElectionError`] is what the elector surfaces
//! to the hosting process.  `ElectionError` also implements
//! [`axum::response::IntoResponse`] so admin handlers can return it directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Failures of a single `get` or `update` against the record store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The stored record changed since this handle last observed it.
    #[error("record was modified concurrently (expected version {expected}, found {actual})")]
    Conflict { expected: u64, actual: u64 },

    /// The backend could not be reached or refused the request.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The stored record could not be encoded or decoded.
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Anything else (blocking task panics, poisoned locks).
    #[error("internal storage error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StorageError {
    /// Whether this error is an optimistic-concurrency rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }

    /// Whether retrying the same read-modify-write cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StorageError::Serialization(_))
    }
}

/// Errors surfaced by the elector.
#[derive(Debug, Error)]
pub enum ElectionError {
    /// The elector configuration failed validation.
    #[error("invalid elector config: {0}")]
    InvalidConfig(String),

    /// A storage round-trip failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Renewal did not succeed within the renew deadline.
    #[error("failed to renew lease within {0:?}")]
    RenewDeadlineExceeded(std::time::Duration),

    /// The run loop was cancelled.
    #[error("elector was cancelled")]
    Cancelled,

    /// A resignation request was not serviced before its deadline.
    #[error("resign request timed out")]
    ResignTimeout,

    /// A release write did not finish within its bound.
    #[error("release did not finish within {0:?}")]
    ReleaseTimeout(std::time::Duration),

    /// No run loop is servicing requests.
    #[error("elector is not running")]
    NotRunning,

    /// `run` was called while another `run` is active on the same elector.
    #[error("elector is already running")]
    AlreadyRunning,
}

impl ElectionError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ElectionError::InvalidConfig(_) => "InvalidConfig",
            ElectionError::Storage(e) if e.is_conflict() => "StorageConflict",
            ElectionError::Storage(_) => "StorageError",
            ElectionError::RenewDeadlineExceeded(_) => "RenewDeadlineExceeded",
            ElectionError::Cancelled => "Cancelled",
            ElectionError::ResignTimeout => "ResignTimeout",
            ElectionError::ReleaseTimeout(_) => "ReleaseTimeout",
            ElectionError::NotRunning => "NotRunning",
            ElectionError::AlreadyRunning => "AlreadyRunning",
        }
    }

    /// HTTP status used by the admin API.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ElectionError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            ElectionError::Storage(e) if e.is_conflict() => StatusCode::CONFLICT,
            ElectionError::Storage(_) => StatusCode::BAD_GATEWAY,
            ElectionError::RenewDeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            ElectionError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ElectionError::ResignTimeout => StatusCode::GATEWAY_TIMEOUT,
            ElectionError::ReleaseTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ElectionError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
            ElectionError::AlreadyRunning => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ElectionError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Result alias for elector operations.
pub type Result<T> = std::result::Result<T, ElectionError>;
