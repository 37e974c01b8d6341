//! Sync runs: extract from the source, upsert into the warehouse, log
//!
//! ```text
//!   sweep ─► log RUNNING ─► fact_order ─► fact_delivery ─► log SUCCESS|FAILED ─► sweep
//! ```
//!
//! A "both" run is one log entry; if either dataset fails the whole entry is
//! FAILED, even when the order half already landed.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use errors::{SyncError, SyncErrorTrait, SyncResult};
use serde::Serialize;
use tracing::{error, info, warn, Level};

use crate::config::SyncSettings;
use crate::facts::{DateRange, FactDeliveryRow, FactOrderRow, FactRow, RowSet};
use crate::maintenance::cleanup_staging_tables;
use crate::store::{FactSource, SyncLogStore, TargetStore};
use crate::sync_log::{truncate_error, SyncStatus, SyncType};
use crate::upsert::{upsert, UpsertOptions, UpsertOutcome};

/// Outcome of one dataset within a run
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset: &'static str,
    pub extracted: usize,
    pub outcome: UpsertOutcome,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub log_id: i32,
    pub sync_type: SyncType,
    pub datasets: Vec<DatasetReport>,
}

impl SyncReport {
    /// Rows inserted or updated across all datasets
    pub fn records_processed(&self) -> u64 {
        self.datasets.iter().map(|d| d.outcome.merged).sum()
    }
}

/// Runs syncs against one source, one target and one log
#[derive(Clone)]
pub struct SyncManager {
    source: Arc<dyn FactSource>,
    target: Arc<dyn TargetStore>,
    log: Arc<dyn SyncLogStore>,
    settings: SyncSettings,
}

impl SyncManager {
    pub fn new(
        source: Arc<dyn FactSource>,
        target: Arc<dyn TargetStore>,
        log: Arc<dyn SyncLogStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            target,
            log,
            settings,
        }
    }

    pub fn target(&self) -> &Arc<dyn TargetStore> {
        &self.target
    }

    pub fn log(&self) -> &Arc<dyn SyncLogStore> {
        &self.log
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn upsert_options(&self) -> UpsertOptions {
        UpsertOptions {
            staging_prefix: self.settings.staging_prefix.clone(),
            batch_size: self.settings.batch_size,
        }
    }

    /// Run with `range` applied to the order dataset
    ///
    /// Errors are written to the log entry and returned.
    pub async fn run(&self, sync_type: SyncType, range: DateRange) -> SyncResult<SyncReport> {
        self.run_on(sync_type, range, Local::now().date_naive()).await
    }

    /// Current calendar month, both datasets
    pub async fn run_current_month(&self) -> SyncResult<SyncReport> {
        let today = Local::now().date_naive();
        self.run_on(SyncType::Both, DateRange::current_month(today), today)
            .await
    }

    /// Same as [`run`](Self::run) with an explicit "today"
    pub async fn run_on(
        &self,
        sync_type: SyncType,
        range: DateRange,
        today: NaiveDate,
    ) -> SyncResult<SyncReport> {
        let (from, to) = range.resolve(today, self.settings.order_start_date)?;
        let prefix = &self.settings.staging_prefix;

        cleanup_staging_tables(self.target.as_ref(), prefix).await;

        let log_id = self.log.start(sync_type).await?;
        info!("Sync #{} started: {}", log_id, sync_type);

        let result = self.sync_datasets(sync_type, from, to).await;

        let closed = match &result {
            Ok(datasets) => {
                let total: u64 = datasets.iter().map(|d| d.outcome.merged).sum();
                let records = i32::try_from(total).unwrap_or(i32::MAX);
                self.log
                    .finish(log_id, SyncStatus::Success, records, None)
                    .await
            },
            Err(e) => {
                log_failure(log_id, e);
                let message = truncate_error(&e.to_string());
                self.log
                    .finish(log_id, SyncStatus::Failed, 0, Some(&message))
                    .await
            },
        };

        let close_error = match closed {
            Ok(true) => None,
            Ok(false) => {
                warn!("Sync #{} was already closed", log_id);
                None
            },
            Err(e) => {
                error!("Could not close sync log entry #{}, it stays RUNNING: {}", log_id, e);
                Some(e)
            },
        };

        cleanup_staging_tables(self.target.as_ref(), prefix).await;

        let datasets = result?;
        // Rows landed but the run is not recorded as finished
        if let Some(e) = close_error {
            return Err(SyncError::Internal(format!(
                "sync #{} completed but its log entry could not be closed: {}",
                log_id, e
            )));
        }
        let report = SyncReport {
            log_id,
            sync_type,
            datasets,
        };
        info!(
            "Sync #{} completed: {} records",
            log_id,
            report.records_processed()
        );
        Ok(report)
    }

    async fn sync_datasets(
        &self,
        sync_type: SyncType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SyncResult<Vec<DatasetReport>> {
        let options = self.upsert_options();
        let mut reports = Vec::new();

        if sync_type.includes_orders() {
            info!("Extracting {} for {}..{}", FactOrderRow::DATASET, from, to);
            let rows = self.source.fetch_orders(from, to).await?;
            reports.push(self.load(rows, &options).await?);
        }

        if sync_type.includes_deliveries() {
            info!("Extracting {}", FactDeliveryRow::DATASET);
            let rows = self.source.fetch_deliveries().await?;
            reports.push(self.load(rows, &options).await?);
        }

        Ok(reports)
    }

    async fn load<R: FactRow>(
        &self,
        rows: Vec<R>,
        options: &UpsertOptions,
    ) -> SyncResult<DatasetReport> {
        let extracted = rows.len();
        info!("{}: {} rows extracted", R::DATASET, extracted);

        let outcome = upsert(
            self.target.as_ref(),
            RowSet::from_facts(rows),
            R::TABLE,
            R::KEY_COLUMNS,
            options,
        )
        .await?;

        Ok(DatasetReport {
            dataset: R::DATASET,
            extracted,
            outcome,
        })
    }
}

/// Log at the level the error's category calls for
fn log_failure(log_id: i32, e: &SyncError) {
    match e.log_level() {
        Level::ERROR => error!("Sync #{} failed [{}]: {}", log_id, e.error_code(), e),
        Level::WARN => warn!("Sync #{} failed [{}]: {}", log_id, e.error_code(), e),
        _ => info!("Sync #{} failed [{}]: {}", log_id, e.error_code(), e),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::schema::ALL_TABLES;
    use crate::store::{MemoryFactSource, MemorySyncLog, MemoryTargetStore};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_failure_is_logged_with_error_code() {
        let source = Arc::new(MemoryFactSource::new());
        source.fail_orders("relation \"tms_order\" does not exist");
        let manager = SyncManager::new(
            source,
            Arc::new(MemoryTargetStore::with_tables(&ALL_TABLES)),
            Arc::new(MemorySyncLog::new()),
            SyncSettings::default(),
        );

        let today = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let result = manager
            .run_on(SyncType::Order, DateRange::default(), today)
            .await;

        assert!(result.is_err());
        assert!(logs_contain("failed [QUERY_FAILED]"));
    }
}
