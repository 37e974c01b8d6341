//! Shared foundation for the TMS warehouse sync services
//!
//! Provides the pieces every binary in the workspace needs:
//! - logging setup and HTTP access logging
//! - service bootstrap (banner, env file loading)
//! - PostgreSQL pool bootstrap
//! - graceful shutdown
//! - HTTP response types

pub mod api_types;
pub mod bootstrap_database;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use api_types::{ActionResponse, ErrorResponse, HealthResponse};

#[cfg(feature = "axum")]
pub use api_types::AppError;

pub use bootstrap_database::{setup_postgres_pool, DatabaseConfig};

// Re-export common dependencies
pub use anyhow;
pub use serde;
pub use serde_json;
pub use tokio;
