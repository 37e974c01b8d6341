//! Upsert through a staging table
//!
//! ```text
//!   RowSet ──► prepare ──► staging ──► INSERT .. ON CONFLICT DO UPDATE ──► target
//!              (keys,        (temp_*)                                      │
//!               dedup,                      DROP staging (always) ◄────────┘
//!               last_synced)
//! ```
//!
//! The merge is last-write-wins on the key columns and never deletes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use errors::{SyncError, SyncResult, UpsertStage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::facts::{Cell, RowSet};
use crate::schema::LAST_SYNCED;
use crate::store::{effective_batch_size, qualified, quote_ident, MergePlan, TargetStore};

/// Name of the staging relation owned by one upsert call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTable {
    name: String,
}

impl StagingTable {
    /// `{prefix}{target}_{YYYYmmdd_HHMMSS_ffffff}`
    pub fn for_target(prefix: &str, target: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: format!("{}{}_{}", prefix, target, now.format("%Y%m%d_%H%M%S_%6f")),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for StagingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Whether `name` has the shape produced by [`StagingTable::for_target`]
pub fn is_staging_name(prefix: &str, name: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };

    // <target>_<8 digits>_<6 digits>_<6 digits>
    let parts: Vec<&str> = rest.rsplitn(4, '_').collect();
    if parts.len() != 4 {
        return false;
    }
    let digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
    let target = parts[3];

    digits(parts[0], 6)
        && digits(parts[1], 6)
        && digits(parts[2], 8)
        && !target.is_empty()
        && target
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// What one upsert did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    /// Rows written to staging
    pub staged: u64,
    /// Rows inserted or updated in the target
    pub merged: u64,
    pub skipped_null_keys: u64,
    pub collapsed_duplicates: u64,
}

/// Merge statement from `staging` into `target`, both in `schema`
///
/// Key columns are never overwritten. With no other columns the conflict
/// does nothing.
pub fn build_merge_sql(
    schema: &str,
    target: &str,
    staging: &str,
    columns: &[String],
    key_columns: &[String],
) -> String {
    let cols = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let keys = key_columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !key_columns.contains(c))
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect();

    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {target} ({cols}) SELECT {cols} FROM {staging} ON CONFLICT ({keys}) {action}",
        target = qualified(schema, target),
        staging = qualified(schema, staging),
    )
}

/// Upsert tuning
#[derive(Debug, Clone)]
pub struct UpsertOptions {
    pub staging_prefix: String,
    pub batch_size: usize,
}

/// Rows ready for staging plus what preparation dropped
#[derive(Debug)]
struct Prepared {
    rows: RowSet,
    skipped_null_keys: u64,
    collapsed_duplicates: u64,
}

fn key_indexes(rows: &RowSet, target: &str, key_columns: &[&str]) -> SyncResult<Vec<usize>> {
    if key_columns.is_empty() {
        return Err(SyncError::upsert(
            target,
            UpsertStage::Prepare,
            "at least one key column is required",
        ));
    }
    key_columns
        .iter()
        .map(|key| {
            rows.column_index(key).ok_or_else(|| {
                SyncError::upsert(
                    target,
                    UpsertStage::Prepare,
                    format!("key column '{}' is not in the result set", key),
                )
            })
        })
        .collect()
}

/// Drop NULL keys, collapse duplicate keys (last wins), stamp `last_synced`
fn prepare(
    rows: RowSet,
    target: &str,
    key_columns: &[&str],
    synced_at: DateTime<Utc>,
) -> SyncResult<Prepared> {
    let keys = key_indexes(&rows, target, key_columns)?;
    let stamp = rows.column_index(LAST_SYNCED).is_none();

    let RowSet { mut columns, rows } = rows;
    if stamp {
        columns.push(LAST_SYNCED.to_string());
    }

    let mut kept: Vec<Vec<Cell>> = Vec::with_capacity(rows.len());
    let mut position: HashMap<Vec<Cell>, usize> = HashMap::with_capacity(rows.len());
    let mut skipped_null_keys = 0;
    let mut collapsed_duplicates = 0;

    for mut row in rows {
        if keys.iter().any(|&i| row[i].is_null()) {
            skipped_null_keys += 1;
            continue;
        }
        if stamp {
            row.push(Cell::TimestampTz(Some(synced_at)));
        }

        let key: Vec<Cell> = keys.iter().map(|&i| row[i].clone()).collect();
        match position.get(&key) {
            Some(&at) => {
                kept[at] = row;
                collapsed_duplicates += 1;
            },
            None => {
                position.insert(key, kept.len());
                kept.push(row);
            },
        }
    }

    if skipped_null_keys > 0 {
        warn!(
            "{}: skipped {} rows with a NULL key column",
            target, skipped_null_keys
        );
    }
    if collapsed_duplicates > 0 {
        warn!(
            "{}: collapsed {} duplicate-key rows, keeping the latest",
            target, collapsed_duplicates
        );
    }

    Ok(Prepared {
        rows: RowSet {
            columns,
            rows: kept,
        },
        skipped_null_keys,
        collapsed_duplicates,
    })
}

/// Stage `rows` and merge them into `target` on `key_columns`
///
/// Empty input returns a zero outcome without touching the store. The
/// staging table is dropped whether or not the merge succeeded.
pub async fn upsert(
    store: &dyn TargetStore,
    rows: RowSet,
    target: &str,
    key_columns: &[&str],
    options: &UpsertOptions,
) -> SyncResult<UpsertOutcome> {
    if rows.is_empty() {
        warn!("No rows to upsert into {}", target);
        return Ok(UpsertOutcome::default());
    }

    let now = Utc::now();
    let prepared = prepare(rows, target, key_columns, now)?;
    let mut outcome = UpsertOutcome {
        skipped_null_keys: prepared.skipped_null_keys,
        collapsed_duplicates: prepared.collapsed_duplicates,
        ..UpsertOutcome::default()
    };

    if prepared.rows.is_empty() {
        warn!("Every row for {} had a NULL key; nothing to upsert", target);
        return Ok(outcome);
    }

    let staging = StagingTable::for_target(&options.staging_prefix, target, now);
    let keys: Vec<String> = key_columns.iter().map(|k| k.to_string()).collect();
    let plan = MergePlan {
        staging: staging.name(),
        target,
        columns: &prepared.rows.columns,
        key_columns: &keys,
        batch_size: effective_batch_size(options.batch_size, prepared.rows.columns.len()),
    };

    debug!(
        "Staging {} rows for {} in {} (batch {})",
        prepared.rows.len(),
        target,
        staging,
        plan.batch_size
    );

    let merged = store.stage_and_merge(&plan, &prepared.rows).await;
    let dropped = store.drop_table(staging.name()).await;

    match (merged, dropped) {
        (Ok(count), Ok(())) => {
            outcome.staged = prepared.rows.len() as u64;
            outcome.merged = count;
            info!("Upserted {} rows into {}", count, target);
            Ok(outcome)
        },
        (Ok(_), Err(e)) => Err(SyncError::upsert(
            target,
            UpsertStage::Drop,
            format!("failed to drop staging table {}: {}", staging, e),
        )),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(drop_err)) => {
            warn!(
                "Staging table {} left behind after failed merge: {}",
                staging, drop_err
            );
            Err(e)
        },
    }
}
