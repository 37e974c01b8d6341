//! Service configuration
//!
//! Layered with figment: built-in defaults, then an optional YAML file, then
//! the environment. Environment names follow the deployment's env file:
//!
//! | Variable                    | Key                |
//! |-----------------------------|--------------------|
//! | `DB_A_HOST` .. `DB_A_SCHEMA` | `source.*`        |
//! | `DB_B_HOST` .. `DB_B_SCHEMA` | `target.*`        |
//! | `BATCH_SIZE`                | `sync.batch_size`  |
//! | `LOG_LEVEL`                 | `logging.level`    |
//! | `WEB_HOST` / `WEB_PORT`     | `web.host` / `web.port` |
//! | `SYNCSRV_<SECTION>__<KEY>`  | any nested key     |

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use common::DatabaseConfig;
use errors::{SyncError, SyncResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default YAML location, used when present
pub const DEFAULT_CONFIG_PATH: &str = "config/syncsrv.yaml";

/// Default web port
pub const DEFAULT_PORT: u16 = 5000;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database A, read-only operational source
    pub source: DatabaseConfig,
    /// Database B, warehouse target
    pub target: DatabaseConfig,
    pub sync: SyncSettings,
    pub web: WebConfig,
    pub logging: LoggingSettings,
    pub maintenance: MaintenanceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Rows per multi-row INSERT into staging
    pub batch_size: usize,
    /// Prefix of staging table names; the sweep only touches tables under it
    pub staging_prefix: String,
    /// Earliest faktur date pulled when no range is given
    pub order_start_date: NaiveDate,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            staging_prefix: "temp_".to_string(),
            order_start_date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl WebConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub dir: PathBuf,
    /// Also write a daily rolling file
    pub file: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: PathBuf::from("logs"),
            file: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSettings {
    /// Seconds between background staging sweeps, 0 disables
    pub cleanup_interval_secs: u64,
    /// Ensure target tables exist at server startup
    pub bootstrap_on_start: bool,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 3600,
            bootstrap_on_start: true,
        }
    }
}

/// Map the flat deployment variables onto nested keys
fn flat_env() -> Env {
    Env::raw()
        .only(&["batch_size", "log_level", "web_host", "web_port"])
        .map(|key| match key.as_str().to_ascii_lowercase().as_str() {
            "batch_size" => "sync.batch_size".into(),
            "log_level" => "logging.level".into(),
            "web_host" => "web.host".into(),
            "web_port" => "web.port".into(),
            other => other.to_string().into(),
        })
}

impl Config {
    /// Build the provider stack
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn figment(path: Option<&Path>) -> SyncResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(SyncError::Configuration(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                figment = figment.merge(Yaml::file(path));
            },
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    figment = figment.merge(Yaml::file(default));
                }
            },
        }

        Ok(figment
            .merge(Env::prefixed("DB_A_").map(|k| format!("source.{}", k).into()))
            .merge(Env::prefixed("DB_B_").map(|k| format!("target.{}", k).into()))
            .merge(flat_env())
            .merge(Env::prefixed("SYNCSRV_").split("__")))
    }

    pub fn from_figment(figment: Figment) -> SyncResult<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| SyncError::Configuration(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    /// Validate configuration completeness
    pub fn validate(&self) -> SyncResult<()> {
        validate_database("source", &self.source)?;
        validate_database("target", &self.target)?;

        if self.sync.batch_size == 0 {
            return Err(invalid("sync.batch_size", "must be greater than zero"));
        }
        if !is_plain_identifier(&self.sync.staging_prefix) {
            return Err(invalid(
                "sync.staging_prefix",
                "must be a non-empty identifier of letters, digits and underscores",
            ));
        }
        if self.web.port == 0 {
            return Err(invalid("web.port", "must be non-zero"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> SyncError {
    SyncError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_database(role: &str, db: &DatabaseConfig) -> SyncResult<()> {
    if db.host.trim().is_empty() {
        return Err(invalid(&format!("{}.host", role), "cannot be empty"));
    }
    if db.name.trim().is_empty() {
        return Err(invalid(&format!("{}.name", role), "cannot be empty"));
    }
    if db.user.trim().is_empty() {
        return Err(invalid(&format!("{}.user", role), "cannot be empty"));
    }
    if !is_plain_identifier(&db.schema) {
        return Err(invalid(
            &format!("{}.schema", role),
            "must be a plain identifier",
        ));
    }
    if db.max_connections == 0 {
        return Err(invalid(
            &format!("{}.max_connections", role),
            "must be greater than zero",
        ));
    }
    Ok(())
}

/// Letters, digits and underscores, not starting with a digit
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Test helper
#[cfg(test)]
pub fn create_test_config() -> Config {
    let db = |name: &str| DatabaseConfig {
        host: "localhost".into(),
        name: name.into(),
        user: "etl".into(),
        password: "secret".into(),
        ..DatabaseConfig::default()
    };
    Config {
        source: db("tms"),
        target: db("warehouse"),
        ..Config::default()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sync.batch_size, 1000);
        assert_eq!(config.sync.staging_prefix, "temp_");
        assert_eq!(
            config.sync.order_start_date,
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
        );
        assert_eq!(config.web.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.source.port, 5432);
        assert_eq!(config.target.schema, "public");
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(create_test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_database_name() {
        let mut config = create_test_config();
        config.target.name.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig { ref field, .. } if field == "target.name"));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = create_test_config();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unsafe_identifiers() {
        let mut config = create_test_config();
        config.source.schema = "public; DROP TABLE x".into();
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.sync.staging_prefix = "temp-".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("tms_fact_order"));
        assert!(is_plain_identifier("_x1"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier("a\"b"));
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
source:
  host: tms-db.internal
  name: tms
  user: reader
target:
  host: dwh.internal
  name: warehouse
  user: writer
  schema: dwh
sync:
  batch_size: 250
web:
  port: 8081
"#
        )
        .unwrap();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(file.path()));
        let config = Config::from_figment(figment).unwrap();

        assert_eq!(config.source.host, "tms-db.internal");
        assert_eq!(config.target.schema, "dwh");
        assert_eq!(config.sync.batch_size, 250);
        assert_eq!(config.sync.staging_prefix, "temp_");
        assert_eq!(config.web.port, 8081);
        assert_eq!(config.web.host, "0.0.0.0");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = Config::figment(Some(Path::new("/nonexistent/syncsrv.yaml"))).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn test_deployment_env_names() {
        std::env::set_var("DB_A_HOST", "tms-a.example");
        std::env::set_var("DB_A_NAME", "tms");
        std::env::set_var("DB_A_USER", "reader");
        std::env::set_var("DB_B_HOST", "dwh-b.example");
        std::env::set_var("DB_B_NAME", "warehouse");
        std::env::set_var("DB_B_USER", "writer");
        std::env::set_var("DB_B_PASSWORD", "12345");
        std::env::set_var("DB_B_PORT", "6543");
        std::env::set_var("BATCH_SIZE", "500");

        let config = Config::from_figment(Config::figment(None).unwrap()).unwrap();

        assert_eq!(config.source.host, "tms-a.example");
        assert_eq!(config.source.user, "reader");
        assert_eq!(config.target.host, "dwh-b.example");
        assert_eq!(config.target.password, "12345");
        assert_eq!(config.target.port, 6543);
        assert_eq!(config.sync.batch_size, 500);
    }
}
