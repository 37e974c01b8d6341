//! Connection provider for the source and target databases

use std::sync::Arc;

use common::setup_postgres_pool;
use errors::SyncResult;
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::orchestrator::SyncManager;
use crate::store::{PgFactSource, PgSyncLog, PgTargetStore, SyncLogStore, TargetStore};

pub const SOURCE_ROLE: &str = "source";
pub const TARGET_ROLE: &str = "target";

/// Pools for both databases, built once per process
#[derive(Clone)]
pub struct Databases {
    pub source: PgPool,
    pub target: PgPool,
}

impl Databases {
    /// Connect both; either failure aborts with a connection error
    pub async fn connect(config: &Config) -> SyncResult<Self> {
        let source = Self::connect_source(config).await?;
        let target = Self::connect_target(config).await?;
        info!("Both databases reachable");
        Ok(Self { source, target })
    }

    pub async fn connect_source(config: &Config) -> SyncResult<PgPool> {
        setup_postgres_pool(&config.source, SOURCE_ROLE).await
    }

    /// The warehouse alone; enough for the log, the sweep and the schema
    pub async fn connect_target(config: &Config) -> SyncResult<PgPool> {
        setup_postgres_pool(&config.target, TARGET_ROLE).await
    }

    pub fn target_store(&self, config: &Config) -> Arc<PgTargetStore> {
        Arc::new(PgTargetStore::new(self.target.clone(), &config.target.schema))
    }

    pub fn sync_log(&self, config: &Config) -> Arc<PgSyncLog> {
        Arc::new(PgSyncLog::new(self.target.clone(), &config.target.schema))
    }

    /// Orchestrator wired to the Postgres backends
    pub fn sync_manager(&self, config: &Config) -> SyncManager {
        let source = Arc::new(PgFactSource::new(self.source.clone(), &config.source.schema));
        let target: Arc<dyn TargetStore> = self.target_store(config);
        let log: Arc<dyn SyncLogStore> = self.sync_log(config);
        SyncManager::new(source, target, log, config.sync.clone())
    }

    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
