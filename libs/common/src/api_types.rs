//! Shared API models for the sync HTTP surface
//!
//! Two body shapes are used by the dashboard: action endpoints answer with
//! `{status, message}` and read endpoints answer errors with `{error}`.

use serde::{Deserialize, Serialize};

// ============================================================================
// Standard API Response Models
// ============================================================================

/// Result of an action endpoint such as a sync trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// "success" or "error"
    pub status: String,
    pub message: String,
}

impl ActionResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Error body for read endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Liveness probe body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

// ============================================================================
// AppError - HTTP Error with proper status codes (requires axum feature)
// ============================================================================

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Action failure carrying its HTTP status; renders as `{status: "error", message}`
#[cfg(feature = "axum")]
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

#[cfg(feature = "axum")]
impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create a 500 Internal Server Error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ActionResponse::error(self.message))).into_response()
    }
}

#[cfg(feature = "axum")]
impl From<errors::SyncError> for AppError {
    fn from(err: errors::SyncError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_action_response_shape() {
        let body = serde_json::to_value(ActionResponse::success("fact_order sync completed successfully"))
            .unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "fact_order sync completed successfully");
        assert!(ActionResponse::success("x").is_success());
        assert!(!ActionResponse::error("x").is_success());
    }

    #[cfg(feature = "axum")]
    #[test]
    fn test_app_error_from_sync_error() {
        let err: AppError = errors::SyncError::Validation("unknown sync type: weekly".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: AppError = errors::SyncError::query("fact_order", "timeout").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("fact_order"));
    }
}
