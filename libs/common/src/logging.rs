//! Unified logging module for the sync services
//!
//! Console output uses a compact `timestamp [LEVEL] message` layout; the file
//! layer rolls daily under the configured log directory. HTTP access lines go
//! to the `api_access` target so they can be filtered independently.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809000Z [INFO] Sync fact_order finished`
pub struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the log file stem and default filter target
    pub service_name: String,
    /// Base directory for logs
    pub log_dir: PathBuf,
    /// Default level when `RUST_LOG` is not set
    pub level: Level,
    /// Write a daily rolling log file next to console output
    pub enable_file: bool,
    /// Emit JSON lines in the file layer
    pub enable_json: bool,
    /// Level for the `api_access` target
    pub api_log_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "syncsrv".to_string(),
            log_dir: PathBuf::from("logs"),
            level: Level::INFO,
            enable_file: true,
            enable_json: false,
            api_log_level: Level::INFO,
        }
    }
}

/// Keeps the non-blocking file writer flushing; drop it on shutdown.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Parse a textual log level, falling back to INFO
pub fn parse_level(level: &str) -> Level {
    level.trim().parse::<Level>().unwrap_or(Level::INFO)
}

/// Build the filter directive used when `RUST_LOG` is absent
fn default_directive(config: &LogConfig) -> String {
    format!(
        "{level},{service}={level},sqlx=warn,api_access={api}",
        level = config.level.as_str().to_lowercase(),
        service = config.service_name.replace('-', "_"),
        api = config.api_log_level.as_str().to_lowercase(),
    )
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(env_str) if !env_str.trim().is_empty() => EnvFilter::new(env_str),
        _ => EnvFilter::new(default_directive(config)),
    }
}

/// Initialize the global subscriber
///
/// Returns a guard that must be held for as long as file logging should keep
/// flushing.
pub fn init_with_config(config: LogConfig) -> Result<LogGuard, Box<dyn std::error::Error>> {
    let env_filter = build_filter(&config);

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let (file_layer, file_guard) = if config.enable_file {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}.log", config.service_name),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_level(true)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed()
        };
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    if config.enable_file {
        tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    }

    Ok(LogGuard { _file: file_guard })
}

/// Console-only logging for CLI tools
pub fn init_console(level: Level) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| {
            EnvFilter::new(format!("{},sqlx=warn", level.as_str().to_lowercase()))
        });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Paths whose GET requests change state and are logged at INFO
#[cfg(feature = "axum")]
fn is_trigger_path(path: &str) -> bool {
    path.starts_with("/sync/")
}

/// HTTP request logging middleware
///
/// State-changing requests log at INFO, read-only requests at DEBUG, both
/// under the `api_access` target.
#[cfg(feature = "axum")]
pub async fn http_request_logger(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use std::time::Instant;
    use tracing::{debug, info};

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    if is_trigger_path(&path) || !matches!(method.as_str(), "GET" | "HEAD" | "OPTIONS") {
        info!(
            target: "api_access",
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "HTTP request"
        );
    } else {
        debug!(
            target: "api_access",
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "HTTP request"
        );
    }

    response
}
