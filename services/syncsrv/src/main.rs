//! syncsrv: warehouse sync dashboard and trigger API

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use common::service_bootstrap::{
    init_logging, load_env_file, print_startup_banner, resolve_env_file, ServiceInfo,
};
use syncsrv::api::{create_router, AppState};
use syncsrv::config::{Config, DEFAULT_PORT};
use syncsrv::maintenance::{cleanup_staging_tables, spawn_periodic_cleanup};
use syncsrv::schema::{bootstrap, TableSelection};
use syncsrv::store::TargetStore;
use syncsrv::Databases;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "syncsrv - TMS data warehouse sync service")]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Env file with DB_A_* / DB_B_* variables
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Listen address, overrides web.host/web.port
    #[arg(short, long, value_name = "HOST:PORT")]
    bind: Option<String>,

    /// Log level, overrides logging.level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Do not create missing warehouse tables at startup
    #[arg(long)]
    skip_bootstrap: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    load_env_file(resolve_env_file(args.env_file.as_deref()));

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    let service_info = ServiceInfo::new(
        "syncsrv",
        "TMS data warehouse sync: fact_order / fact_delivery",
        DEFAULT_PORT,
    )
    .with_version(env!("CARGO_PKG_VERSION"));
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let _log_guard = init_logging(
        &service_info,
        &level,
        config.logging.dir.clone(),
        config.logging.file,
    )?;
    print_startup_banner(&service_info);

    let databases = Databases::connect(&config).await?;
    let target_store = databases.target_store(&config);

    if config.maintenance.bootstrap_on_start && !args.skip_bootstrap {
        let report = bootstrap(target_store.as_ref(), TableSelection::All, false).await?;
        info!("Schema ready: {} tables checked", report.tables.len());
    }

    cleanup_staging_tables(target_store.as_ref(), &config.sync.staging_prefix).await;

    let cleanup_task = match config.maintenance.cleanup_interval_secs {
        0 => None,
        secs => {
            info!("Staging sweep every {}s", secs);
            let store: Arc<dyn TargetStore> = target_store.clone();
            Some(spawn_periodic_cleanup(
                store,
                config.sync.staging_prefix.clone(),
                Duration::from_secs(secs),
            ))
        },
    };

    let state = AppState::new(databases.sync_manager(&config));
    let app = create_router(state);

    let bind = args.bind.unwrap_or_else(|| config.web.bind_address());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!("Dashboard listening on http://{}", bind);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(common::shutdown::wait_for_shutdown())
        .await
    {
        error!("Server error: {}", e);
    }

    if let Some(task) = cleanup_task {
        task.abort();
    }
    databases.close().await;
    info!("syncsrv stopped");

    Ok(())
}
