//! Core error taxonomy shared by every subsystem.
//!
//! Resilience primitives, the tenancy layer, and the pipeline never raise
//! plain strings or `anyhow::Error` across their public boundary: callers
//! match on `CoreError` to decide how to shape an HTTP response or whether
//! a retry makes sense. Internal helpers may still use `anyhow` for
//! one-off startup plumbing (see `ConfigError`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

pub type CoreResult<T> = Result<T, CoreError>;

/// Every error kind a core subsystem can surface to a caller.
#[derive(Debug, Clone)]
pub enum CoreError {
    /// A circuit breaker rejected a call while OPEN.
    CircuitOpen {
        breaker: String,
        retry_after_secs: f64,
    },
    /// A bulkhead timed out waiting for a free slot.
    BulkheadFull { name: String },
    /// A rate limiter (or the isolation middleware) denied the request.
    RateLimited { retry_after_secs: f64, reason: String },
    /// A retry-wrapped call exhausted its attempt budget.
    MaxRetriesExceeded { attempts: u32, last_error: String },
    /// The query filter or policy engine denied access.
    PermissionDenied { reason: String },
    /// A `TenantContext` failed validation (empty workspace/user).
    InvalidContext { reason: String },
    /// `require_context()` was called with no active context.
    ContextMissing,
    /// The pipeline's validate stage rejected an order.
    ValidationRejection { reason: String },
    /// The pipeline's risk-check stage rejected an order.
    RiskRejection { reason: String },
    /// A builder/config object failed to construct.
    ConfigError { reason: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::CircuitOpen { breaker, retry_after_secs } => write!(
                f,
                "circuit '{breaker}' is open, retry after {retry_after_secs:.1}s"
            ),
            CoreError::BulkheadFull { name } => write!(f, "bulkhead '{name}' has no free slots"),
            CoreError::RateLimited { reason, .. } => write!(f, "rate limited: {reason}"),
            CoreError::MaxRetriesExceeded { attempts, last_error } => write!(
                f,
                "exhausted {attempts} attempt(s), last error: {last_error}"
            ),
            CoreError::PermissionDenied { reason } => write!(f, "permission denied: {reason}"),
            CoreError::InvalidContext { reason } => write!(f, "invalid tenant context: {reason}"),
            CoreError::ContextMissing => write!(f, "no tenant context is active on this task"),
            CoreError::ValidationRejection { reason } => write!(f, "validation rejected: {reason}"),
            CoreError::RiskRejection { reason } => write!(f, "risk check rejected: {reason}"),
            CoreError::ConfigError { reason } => write!(f, "config error: {reason}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, retry_after) = match &self {
            CoreError::CircuitOpen { retry_after_secs, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, Some(*retry_after_secs))
            }
            CoreError::BulkheadFull { .. } => (StatusCode::SERVICE_UNAVAILABLE, None),
            CoreError::RateLimited { retry_after_secs, .. } => {
                (StatusCode::TOO_MANY_REQUESTS, Some(*retry_after_secs))
            }
            CoreError::MaxRetriesExceeded { .. } => (StatusCode::SERVICE_UNAVAILABLE, None),
            CoreError::PermissionDenied { .. } => (StatusCode::FORBIDDEN, None),
            CoreError::InvalidContext { .. } | CoreError::ContextMissing => {
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            CoreError::ValidationRejection { .. } | CoreError::RiskRejection { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, None)
            }
            CoreError::ConfigError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let body = serde_json::json!({ "detail": self.to_string() });
        let mut headers = Vec::new();
        if let Some(secs) = retry_after {
            headers.push(("Retry-After", (secs.ceil() as u64 + 1).to_string()));
        }
        (status, headers, axum::Json(body)).into_response()
    }
}
