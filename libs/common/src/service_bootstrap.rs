//! Unified service bootstrap utilities
//!
//! Startup banner, logging initialization and environment file loading shared
//! by the sync server and the operator CLI.

use std::path::{Path, PathBuf};

use crate::logging::{self, LogConfig, LogGuard};
use tracing::{debug, info, Level};

/// Default env file read at startup
pub const DEFAULT_ENV_FILE: &str = "config.env";

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "syncsrv")
    pub name: String,
    /// Service version
    pub version: String,
    /// Service description
    pub description: String,
    /// Default port
    pub default_port: u16,
}

impl ServiceInfo {
    /// Create new service info
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_port: u16) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            default_port,
        }
    }

    /// Report the binary's version instead of this crate's
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Print startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ███████╗██╗   ██╗███╗   ██╗ ██████╗███████╗██████╗ ██╗   ██╗
 ██╔════╝╚██╗ ██╔╝████╗  ██║██╔════╝██╔════╝██╔══██╗██║   ██║
 ███████╗ ╚████╔╝ ██╔██╗ ██║██║     ███████╗██████╔╝██║   ██║
 ╚════██║  ╚██╔╝  ██║╚██╗██║██║     ╚════██║██╔══██╗╚██╗ ██╔╝
 ███████║   ██║   ██║ ╚████║╚██████╗███████║██║  ██║ ╚████╔╝
 ╚══════╝   ╚═╝   ╚═╝  ╚═══╝ ╚═════╝╚══════╝╚═╝  ╚═╝  ╚═══╝
            "#;

    info!("{}", banner);
    info!("");
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
    info!("");
}

/// Initialize logging for a service
///
/// `level` is the configured default; `RUST_LOG` still overrides it.
pub fn init_logging(
    service: &ServiceInfo,
    level: &str,
    log_dir: impl Into<PathBuf>,
    enable_file: bool,
) -> anyhow::Result<LogGuard> {
    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: log_dir.into(),
        level: logging::parse_level(level),
        enable_file,
        enable_json: false,
        api_log_level: Level::INFO,
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))
}

/// Load `KEY=VALUE` pairs from an env file into the process environment
///
/// Variables that are already set win. A missing file is not an error.
/// Returns whether a file was loaded.
pub fn load_env_file(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    if !path.exists() {
        debug!("Env file {} not found, using process environment", path.display());
        return false;
    }

    match dotenv::from_path(path) {
        Ok(()) => {
            debug!("Loaded env file {}", path.display());
            true
        },
        Err(e) => {
            tracing::warn!("Failed to load env file {}: {}", path.display(), e);
            false
        },
    }
}

/// Resolve the env file: explicit path, then `SYNCSRV_ENV_FILE`, then the default
pub fn resolve_env_file(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var("SYNCSRV_ENV_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENV_FILE))
}
