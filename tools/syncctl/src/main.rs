//! syncctl - operator tool for the TMS data warehouse sync
//!
//! Runs syncs, inspects the sync log, sweeps staging tables and bootstraps
//! the warehouse schema without going through the web service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use common::logging::init_console;
use common::service_bootstrap::{load_env_file, resolve_env_file};
use errors::SyncErrorTrait;
use syncsrv::maintenance::cleanup_staging_tables;
use syncsrv::schema::{bootstrap, TableAction, TableSelection};
use syncsrv::status::{clamp_limit, format_time};
use syncsrv::store::{
    FactSource, PgFactSource, PgSyncLog, PgTargetStore, SyncLogStore, TargetStore,
};
use syncsrv::sync_log::{parse_sync_type, truncate_chars};
use syncsrv::{Config, Databases, DateRange, SyncManager, SyncReport, SyncStatus, SyncType};

/// Width of the error column in `status` output
const ERROR_COLUMN: usize = 30;

#[derive(Parser)]
#[command(name = "syncctl")]
#[command(about = "TMS warehouse sync - operator CLI")]
#[command(long_about = "TMS warehouse sync - operator CLI

Examples:
  syncctl sync --type fact_order --from 2025-01-01 --to 2025-01-31
  syncctl monthly                       # Both datasets, current month
  syncctl status --limit 20             # Recent sync log entries
  syncctl cleanup                       # Drop leftover staging tables
  syncctl schema --table all            # Create missing warehouse tables
  syncctl check                         # Test both database connections")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file (default: config/syncsrv.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Environment file (default: SYNCSRV_ENV_FILE or ./config.env)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync now
    Sync {
        /// fact_order, fact_delivery or both
        #[arg(short, long = "type", default_value = "both")]
        sync_type: String,

        /// First faktur date, YYYY-MM-DD (default: configured start date)
        #[arg(long)]
        from: Option<String>,

        /// Last faktur date, YYYY-MM-DD (default: today)
        #[arg(long)]
        to: Option<String>,
    },

    /// Sync both datasets for the current calendar month
    Monthly,

    /// Show recent sync log entries
    Status {
        /// Only show one sync type
        #[arg(short, long = "type")]
        sync_type: Option<String>,

        /// Number of entries
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },

    /// Drop leftover staging tables
    Cleanup,

    /// Create warehouse tables, indexes and triggers
    Schema {
        /// fact_order, fact_delivery, sync_log or all
        #[arg(short, long, default_value = "all")]
        table: String,

        /// Drop and recreate existing tables (loses their rows)
        #[arg(short, long)]
        force: bool,
    },

    /// Test both database connections
    Check,

    /// Show columns, indexes and constraints of a warehouse table
    Describe {
        /// Table name
        table: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    init_console(if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    });

    load_env_file(resolve_env_file(cli.env_file.as_deref()));
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Bad arguments fail here, before any connection attempt
    let job = Job::from_command(cli.command)?;

    let source_pool = if job.needs_source() {
        let pool = Databases::connect_source(&config)
            .await
            .context("Failed to connect to the source database")?;
        Some(pool)
    } else {
        None
    };
    let target_pool = Databases::connect_target(&config)
        .await
        .context("Failed to connect to the target database")?;

    let backends = Backends {
        source: source_pool.as_ref().map(|pool| {
            let source = PgFactSource::new(pool.clone(), &config.source.schema);
            Arc::new(source) as Arc<dyn FactSource>
        }),
        target: Arc::new(PgTargetStore::new(target_pool.clone(), &config.target.schema)),
        log: Arc::new(PgSyncLog::new(target_pool.clone(), &config.target.schema)),
    };

    let result = run_job(job, &config, &backends).await;

    if let Some(pool) = source_pool {
        pool.close().await;
    }
    target_pool.close().await;
    result
}

/// A command with its arguments parsed and checked
enum Job {
    Sync {
        sync_type: SyncType,
        range: DateRange,
    },
    Monthly,
    Status {
        filter: Option<SyncType>,
        limit: i64,
    },
    Cleanup,
    Schema {
        selection: TableSelection,
        force: bool,
    },
    Check,
    Describe {
        table: String,
    },
}

impl Job {
    fn from_command(command: Commands) -> Result<Self> {
        let job = match command {
            Commands::Sync {
                sync_type,
                from,
                to,
            } => Self::Sync {
                sync_type: parse_sync_type(&sync_type)?,
                range: DateRange::new(parse_date(from.as_deref())?, parse_date(to.as_deref())?)?,
            },
            Commands::Monthly => Self::Monthly,
            Commands::Status { sync_type, limit } => Self::Status {
                filter: sync_type.as_deref().map(parse_sync_type).transpose()?,
                limit: clamp_limit(Some(limit)),
            },
            Commands::Cleanup => Self::Cleanup,
            Commands::Schema { table, force } => Self::Schema {
                selection: table.parse()?,
                force,
            },
            Commands::Check => Self::Check,
            Commands::Describe { table } => Self::Describe { table },
        };
        Ok(job)
    }

    /// Everything else only touches the warehouse
    fn needs_source(&self) -> bool {
        matches!(self, Self::Sync { .. } | Self::Monthly | Self::Check)
    }
}

/// Stores a job runs against; `source` is only set when the job needs it
struct Backends {
    source: Option<Arc<dyn FactSource>>,
    target: Arc<dyn TargetStore>,
    log: Arc<dyn SyncLogStore>,
}

impl Backends {
    fn source(&self) -> Result<&Arc<dyn FactSource>> {
        self.source
            .as_ref()
            .context("Source database is not connected")
    }

    fn sync_manager(&self, config: &Config) -> Result<SyncManager> {
        Ok(SyncManager::new(
            self.source()?.clone(),
            self.target.clone(),
            self.log.clone(),
            config.sync.clone(),
        ))
    }
}

async fn run_job(job: Job, config: &Config, backends: &Backends) -> Result<()> {
    match job {
        Job::Sync { sync_type, range } => {
            println!(
                "{} {}",
                "Starting sync:".bright_cyan(),
                sync_type.as_str().bright_yellow()
            );

            let manager = backends.sync_manager(config)?;
            match manager.run(sync_type, range).await {
                Ok(report) => print_report(&report),
                Err(e) => {
                    println!("{} [{}] {}", "✗".red(), e.error_code(), e);
                    if e.is_retryable() {
                        println!("  {}", "Transient failure, safe to run again".yellow());
                    }
                    return Err(e.into());
                },
            }
        },
        Job::Monthly => {
            println!("{}", "Starting monthly sync".bright_cyan());
            let report = backends.sync_manager(config)?.run_current_month().await?;
            print_report(&report);
        },
        Job::Status { filter, limit } => {
            let entries = backends.log.recent(filter, limit).await?;
            print_status(&entries);
        },
        Job::Cleanup => {
            let report =
                cleanup_staging_tables(backends.target.as_ref(), &config.sync.staging_prefix).await;
            println!(
                "{} found {}, dropped {}",
                "Staging sweep:".bright_cyan(),
                report.found,
                report.dropped.to_string().green()
            );
            for name in &report.failed {
                println!("  {} {}", "✗ could not drop".red(), name);
            }
        },
        Job::Schema { selection, force } => {
            if force {
                println!(
                    "{}",
                    "Force mode: existing tables are dropped and their rows are lost"
                        .yellow()
                        .bold()
                );
            }
            let report = bootstrap(backends.target.as_ref(), selection, force).await?;
            for (name, action) in &report.tables {
                let label = match action {
                    TableAction::Created => "created".green(),
                    TableAction::AlreadyPresent => "already present".normal(),
                    TableAction::Recreated => "recreated".yellow(),
                };
                println!("  {:<20} {}", name, label);
            }
        },
        Job::Check => {
            println!(
                "{} {}\n  {}",
                "✓ source".green(),
                config.source.display_target(),
                backends.source()?.server_version().await?
            );
            println!(
                "{} {}\n  {}",
                "✓ target".green(),
                config.target.display_target(),
                backends.target.server_version().await?
            );
        },
        Job::Describe { table } => {
            let description = backends.target.describe_table(&table).await?;

            println!("{} {}", "Table".bright_cyan(), description.table.bold());
            println!("\n{}", "Columns".bright_cyan());
            for column in &description.columns {
                let data_type = match column.max_length {
                    Some(len) => format!("{}({})", column.data_type, len),
                    None => column.data_type.clone(),
                };
                println!(
                    "  {:<28} {:<32} {:<9} {}",
                    column.name,
                    data_type,
                    if column.nullable { "NULL" } else { "NOT NULL" },
                    column.default.as_deref().unwrap_or("")
                );
            }
            println!("\n{}", "Indexes".bright_cyan());
            for index in &description.indexes {
                println!("  {:<40} {}", index.name, index.definition);
            }
            println!("\n{}", "Constraints".bright_cyan());
            for constraint in &description.constraints {
                println!(
                    "  {:<40} {} {}",
                    constraint.name, constraint.kind, constraint.definition
                );
            }
        },
    }

    Ok(())
}

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", v))
        })
        .transpose()
}

fn print_report(report: &SyncReport) {
    for dataset in &report.datasets {
        println!(
            "  {:<14} extracted {:>7}  merged {:>7}",
            dataset.dataset, dataset.extracted, dataset.outcome.merged
        );
        if dataset.outcome.skipped_null_keys > 0 {
            println!(
                "  {:<14} {} rows skipped for NULL keys",
                "",
                dataset.outcome.skipped_null_keys.to_string().yellow()
            );
        }
    }
    println!(
        "{} {} records processed (log #{})",
        "✓".green(),
        report.records_processed(),
        report.log_id
    );
}

fn print_status(entries: &[syncsrv::SyncLogEntry]) {
    if entries.is_empty() {
        println!("{}", "No sync runs recorded".yellow());
        return;
    }

    println!(
        "{:<6} {:<14} {:<20} {:<20} {:<8} {:>9}  {}",
        "ID", "TYPE", "STARTED", "ENDED", "STATUS", "RECORDS", "ERROR"
    );
    for entry in entries {
        let status = match entry.status {
            SyncStatus::Success => entry.status.as_str().green(),
            SyncStatus::Failed => entry.status.as_str().red(),
            SyncStatus::Running => entry.status.as_str().yellow(),
        };
        let error = entry
            .error_message
            .as_deref()
            .map(|m| truncate_chars(m, ERROR_COLUMN))
            .unwrap_or_default();
        println!(
            "{:<6} {:<14} {:<20} {:<20} {:<8} {:>9}  {}",
            entry.id,
            entry.sync_type,
            format_time(entry.start_time),
            entry.end_time.map(format_time).unwrap_or_default(),
            status,
            entry.records_processed,
            error
        );
    }
}
