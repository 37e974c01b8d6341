//! Sync history snapshot for the dashboard and CLI

use chrono::{DateTime, Local, Utc};
use errors::SyncResult;
use serde::{Deserialize, Serialize};

use crate::store::SyncLogStore;
use crate::sync_log::{SyncLogEntry, SyncStatus, SyncType};

pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
pub const MAX_HISTORY_LIMIT: i64 = 500;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_syncs: usize,
    pub successful_syncs: usize,
    pub failed_syncs: usize,
    /// Start of the newest entry, or "Never"
    pub last_sync: String,
}

/// One history row as shown to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i32,
    pub sync_type: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: SyncStatus,
    pub records_processed: i32,
    pub error_message: Option<String>,
    /// Seconds between start and end, once closed
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub stats: SyncStats,
    pub sync_history: Vec<HistoryEntry>,
}

/// Render a UTC time in the server's local zone
pub fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

/// Clamp a requested history size into `1..=MAX_HISTORY_LIMIT`
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

impl From<SyncLogEntry> for HistoryEntry {
    fn from(entry: SyncLogEntry) -> Self {
        let duration_secs = entry
            .end_time
            .map(|end| (end - entry.start_time).num_milliseconds() as f64 / 1000.0);
        Self {
            id: entry.id,
            sync_type: entry.sync_type,
            start_time: format_time(entry.start_time),
            end_time: entry.end_time.map(format_time),
            status: entry.status,
            records_processed: entry.records_processed,
            error_message: entry.error_message,
            duration_secs,
        }
    }
}

/// Counts are over the returned entries only
pub fn summarize(entries: &[SyncLogEntry]) -> SyncStats {
    SyncStats {
        total_syncs: entries.len(),
        successful_syncs: entries
            .iter()
            .filter(|e| e.status == SyncStatus::Success)
            .count(),
        failed_syncs: entries
            .iter()
            .filter(|e| e.status == SyncStatus::Failed)
            .count(),
        last_sync: entries
            .iter()
            .map(|e| e.start_time)
            .max()
            .map(format_time)
            .unwrap_or_else(|| "Never".to_string()),
    }
}

/// Newest `limit` entries (default 20, at most 500) with derived counts
pub async fn snapshot(
    log: &dyn SyncLogStore,
    filter: Option<SyncType>,
    limit: Option<i64>,
) -> SyncResult<StatusSnapshot> {
    let entries = log.recent(filter, clamp_limit(limit)).await?;
    Ok(StatusSnapshot {
        stats: summarize(&entries),
        sync_history: entries.into_iter().map(HistoryEntry::from).collect(),
    })
}
