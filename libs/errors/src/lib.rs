//! Unified error handling for the TMS warehouse sync
//!
//! Every crate in the workspace reports failures through [`SyncError`]. The
//! variants mirror the failure points of a sync run: reaching a database,
//! extracting a dataset, moving rows through staging, and rejecting bad input.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// SyncError - Main error type
// ============================================================================

/// Stage of an upsert at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStage {
    Prepare,
    Stage,
    Merge,
    Drop,
}

impl std::fmt::Display for UpsertStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Prepare => "prepare",
            Self::Stage => "stage",
            Self::Merge => "merge",
            Self::Drop => "drop",
        };
        f.write_str(name)
    }
}

/// Main error type for the warehouse sync
#[derive(Debug, Error)]
pub enum SyncError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Database Errors
    // ======================================
    /// A database could not be reached or rejected the login
    #[error("Connection to {role} database failed: {reason}")]
    Connection { role: String, reason: String },

    /// Extraction SQL failed or a row could not be decoded
    #[error("Query for {dataset} failed: {message}")]
    Query { dataset: String, message: String },

    /// Staging, merge or staging drop failed
    #[error("Upsert into {table} failed during {stage}: {message}")]
    Upsert {
        table: String,
        stage: UpsertStage,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // ======================================
    // Validation Errors
    // ======================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),


    // ======================================
    // Runtime Errors
    // ======================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub fn connection(role: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            role: role.into(),
            reason: reason.to_string(),
        }
    }

    pub fn query(dataset: impl Into<String>, message: impl ToString) -> Self {
        Self::Query {
            dataset: dataset.into(),
            message: message.to_string(),
        }
    }

    pub fn upsert(table: impl Into<String>, stage: UpsertStage, message: impl ToString) -> Self {
        Self::Upsert {
            table: table.into(),
            stage,
            message: message.to_string(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::Validation(_) => 400,

            // 404 Not Found
            Self::NotFound { .. } => 404,

            // 502 Bad Gateway
            Self::Connection { .. } => 502,

            // 500 Internal Server Error
            Self::Configuration(_)
            | Self::InvalidConfig { .. }
            | Self::Query { .. }
            | Self::Upsert { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Internal(_)
            | Self::Other(_) => 500,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

// ============================================================================
// SyncError implements SyncErrorTrait
// ============================================================================

impl SyncErrorTrait for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Connection { .. } => "CONNECTION_FAILED",
            Self::Query { .. } => "QUERY_FAILED",
            Self::Upsert { .. } => "UPSERT_FAILED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,

            Self::Connection { .. } => ErrorCategory::Connection,

            Self::Query { .. } | Self::Upsert { .. } | Self::Database(_) => {
                ErrorCategory::Database
            },

            Self::Validation(_) => ErrorCategory::Validation,

            Self::NotFound { .. } => ErrorCategory::NotFound,

            Self::Io(_) | Self::Internal(_) => ErrorCategory::Internal,

            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

// ============================================================================
// Error Trait - Architectural layer
// ============================================================================

/// Error category enum - used for classification and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Connection,
    Database,

    // Business logic layer
    Validation,
    NotFound,

    // System level
    Internal,
    Unknown,
}

/// Error capability trait
///
/// Stable codes for CLI output and logs, plus a category that decides the
/// log level.
pub trait SyncErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for CLI output, logs)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Database => Level::ERROR,
            ErrorCategory::Connection | ErrorCategory::Configuration => Level::WARN,
            ErrorCategory::Validation | ErrorCategory::NotFound => Level::INFO,
            ErrorCategory::Unknown => Level::WARN,
        }
    }
}
