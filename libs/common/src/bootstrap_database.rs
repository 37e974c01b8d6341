//! Database connection and setup utilities
//!
//! PostgreSQL pool construction for the source and target databases.

use std::time::Duration;

use errors::{SyncError, SyncResult};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{debug, info};

/// Database connection configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(deserialize_with = "lenient_string")]
    pub host: String,
    pub port: u16,
    /// Database name
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub user: String,
    #[serde(deserialize_with = "lenient_string")]
    pub password: String,
    /// Schema that queries and tables are qualified with
    pub schema: String,
    /// Maximum pool connections
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: String::new(),
            user: String::new(),
            password: String::new(),
            schema: "public".to_string(),
            max_connections: 5,
            connect_timeout: 10,
        }
    }
}

/// Accept scalars where a string is expected
///
/// Environment providers parse `DB_B_PASSWORD=12345` as a number.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Str(s) => s,
        Scalar::Int(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
        Scalar::Bool(b) => b.to_string(),
    })
}

// Password stays out of logs and panics.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("schema", &self.schema)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl DatabaseConfig {
    /// `host:port/name` for log lines
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.name)
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .password(&self.password)
    }
}

/// Setup a PostgreSQL pool and verify it answers `SELECT 1`
///
/// `role` names the database in errors and logs ("source", "target").
pub async fn setup_postgres_pool(config: &DatabaseConfig, role: &str) -> SyncResult<PgPool> {
    info!("{} DB: {}", role, config.display_target());

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .connect_with(config.connect_options())
        .await
        .map_err(|e| SyncError::connection(role, e))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| SyncError::connection(role, format!("connection test failed: {}", e)))?;

    debug!("{} pool ready", role);
    Ok(pool)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_default_database_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.schema, "public");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.connect_timeout, 10);
    }

    #[test]
    fn test_debug_hides_password() {
        let config = DatabaseConfig {
            password: "hunter2".into(),
            ..DatabaseConfig::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn test_numeric_password_deserializes() {
        let config: DatabaseConfig =
            serde_json::from_value(serde_json::json!({"password": 12345, "user": "etl"})).unwrap();
        assert_eq!(config.password, "12345");
        assert_eq!(config.user, "etl");
        assert_eq!(config.port, 5432);
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connection_error() {
        let config = DatabaseConfig {
            host: "127.0.0.1".into(),
            port: 1,
            name: "warehouse".into(),
            user: "nobody".into(),
            connect_timeout: 1,
            ..DatabaseConfig::default()
        };
        let err = setup_postgres_pool(&config, "target").await.unwrap_err();
        assert!(matches!(err, SyncError::Connection { ref role, .. } if role == "target"));
    }
}
