//! PostgreSQL backends over `sqlx::PgPool`

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use errors::{SyncError, SyncResult, UpsertStage};
use sqlx::postgres::Postgres;
use sqlx::query_builder::Separated;
use sqlx::{FromRow, PgPool, QueryBuilder};
use tracing::debug;

use super::{
    like_prefix, qualified, ColumnInfo, ConstraintInfo, FactSource, IndexInfo, MergePlan,
    SyncLogStore, TableDescription, TargetStore,
};
use crate::facts::{decode_error, delivery, order, Cell, FactDeliveryRow, FactOrderRow, FactRow, RowSet};
use crate::schema::{render_ddl, TableDef, SYNC_LOG_TABLE};
use crate::sync_log::{SyncLogEntry, SyncStatus, SyncType};
use crate::upsert::build_merge_sql;

async fn server_version(pool: &PgPool) -> SyncResult<String> {
    let version: String = sqlx::query_scalar("SELECT version()")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

// ============================================================================
// Source
// ============================================================================

/// Fact extraction from database A
pub struct PgFactSource {
    pool: PgPool,
    schema: String,
}

impl PgFactSource {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }
}

#[async_trait]
impl FactSource for PgFactSource {
    async fn fetch_orders(&self, from: NaiveDate, to: NaiveDate) -> SyncResult<Vec<FactOrderRow>> {
        debug!("Extracting {} for {}..{}", FactOrderRow::DATASET, from, to);
        sqlx::query_as::<_, FactOrderRow>(&order::query_sql(&self.schema))
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| decode_error(FactOrderRow::DATASET, e))
    }

    async fn fetch_deliveries(&self) -> SyncResult<Vec<FactDeliveryRow>> {
        debug!("Extracting {} (full history)", FactDeliveryRow::DATASET);
        sqlx::query_as::<_, FactDeliveryRow>(&delivery::query_sql(&self.schema))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| decode_error(FactDeliveryRow::DATASET, e))
    }

    async fn server_version(&self) -> SyncResult<String> {
        server_version(&self.pool).await
    }
}

// ============================================================================
// Target
// ============================================================================

/// Warehouse tables in database B
pub struct PgTargetStore {
    pool: PgPool,
    schema: String,
}

impl PgTargetStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    fn table(&self, name: &str) -> String {
        qualified(&self.schema, name)
    }
}

fn bind_cell(b: &mut Separated<'_, '_, Postgres, &'static str>, cell: &Cell) {
    match cell {
        Cell::Text(v) => b.push_bind(v.clone()),
        Cell::Date(v) => b.push_bind(*v),
        Cell::Timestamp(v) => b.push_bind(*v),
        Cell::TimestampTz(v) => b.push_bind(*v),
        Cell::Time(v) => b.push_bind(*v),
        Cell::Numeric(v) => b.push_bind(*v),
    };
}

#[async_trait]
impl TargetStore for PgTargetStore {
    async fn stage_and_merge(&self, plan: &MergePlan<'_>, rows: &RowSet) -> SyncResult<u64> {
        let stage_err = |e: sqlx::Error| SyncError::upsert(plan.target, UpsertStage::Stage, e);
        let merge_err = |e: sqlx::Error| SyncError::upsert(plan.target, UpsertStage::Merge, e);

        let staging = self.table(plan.staging);
        let target = self.table(plan.target);
        let cols = plan
            .columns
            .iter()
            .map(|c| super::quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await.map_err(stage_err)?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", staging))
            .execute(&mut *tx)
            .await
            .map_err(stage_err)?;

        // Same column types as the target, no constraints
        sqlx::query(&format!(
            "CREATE TABLE {} AS SELECT {} FROM {} WITH NO DATA",
            staging, cols, target
        ))
        .execute(&mut *tx)
        .await
        .map_err(stage_err)?;

        for chunk in rows.rows.chunks(plan.batch_size.max(1)) {
            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", staging, cols));
            builder.push_values(chunk, |mut b, row| {
                for cell in row {
                    bind_cell(&mut b, cell);
                }
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(stage_err)?;
        }
        debug!("Loaded {} rows into {}", rows.len(), plan.staging);

        let merge_sql = build_merge_sql(
            &self.schema,
            plan.target,
            plan.staging,
            plan.columns,
            plan.key_columns,
        );
        let merged = sqlx::query(&merge_sql)
            .execute(&mut *tx)
            .await
            .map_err(merge_err)?
            .rows_affected();

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", staging))
            .execute(&mut *tx)
            .await
            .map_err(merge_err)?;

        tx.commit().await.map_err(merge_err)?;

        Ok(merged)
    }

    async fn drop_table(&self, table: &str) -> SyncResult<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table(table)))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_tables(&self, prefix: &str) -> SyncResult<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1
              AND table_name LIKE $2 ESCAPE '\'
            ORDER BY table_name
            "#,
        )
        .bind(&self.schema)
        .bind(like_prefix(prefix))
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn table_exists(&self, table: &str) -> SyncResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn ensure_table(&self, def: &TableDef) -> SyncResult<()> {
        sqlx::raw_sql(&render_ddl(&self.schema, def))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn drop_table_cascade(&self, table: &str) -> SyncResult<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {} CASCADE", self.table(table)))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn describe_table(&self, table: &str) -> SyncResult<TableDescription> {
        let columns: Vec<(String, String, Option<i32>, String, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT column_name::text,
                       data_type::text,
                       character_maximum_length::int4,
                       is_nullable::text,
                       column_default::text
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY ordinal_position
                "#,
            )
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        if columns.is_empty() {
            return Err(SyncError::NotFound {
                resource: format!("table {}.{}", self.schema, table),
            });
        }

        let indexes: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT indexname::text, indexdef
            FROM pg_indexes
            WHERE schemaname = $1 AND tablename = $2
            ORDER BY indexname
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        let constraints: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT con.conname::text, con.contype::text, pg_get_constraintdef(con.oid)
            FROM pg_constraint con
            JOIN pg_class rel ON rel.oid = con.conrelid
            JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
            WHERE nsp.nspname = $1 AND rel.relname = $2
            ORDER BY con.conname
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(TableDescription {
            table: table.to_string(),
            columns: columns
                .into_iter()
                .map(|(name, data_type, max_length, nullable, default)| ColumnInfo {
                    name,
                    data_type,
                    max_length,
                    nullable: nullable == "YES",
                    default,
                })
                .collect(),
            indexes: indexes
                .into_iter()
                .map(|(name, definition)| IndexInfo { name, definition })
                .collect(),
            constraints: constraints
                .into_iter()
                .map(|(name, kind, definition)| ConstraintInfo {
                    name,
                    kind,
                    definition,
                })
                .collect(),
        })
    }

    async fn server_version(&self) -> SyncResult<String> {
        server_version(&self.pool).await
    }
}

// ============================================================================
// Sync log
// ============================================================================

/// `sync_log` table in database B
pub struct PgSyncLog {
    pool: PgPool,
    table: String,
}

impl PgSyncLog {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            table: qualified(schema, SYNC_LOG_TABLE),
        }
    }
}

#[derive(FromRow)]
struct LogRow {
    id: i32,
    sync_type: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    records_processed: i32,
    error_message: Option<String>,
}

impl TryFrom<LogRow> for SyncLogEntry {
    type Error = SyncError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            sync_type: row.sync_type,
            start_time: row.start_time.unwrap_or_default(),
            end_time: row.end_time,
            status: row.status.parse()?,
            records_processed: row.records_processed,
            error_message: row.error_message,
        })
    }
}

#[async_trait]
impl SyncLogStore for PgSyncLog {
    async fn start(&self, sync_type: SyncType) -> SyncResult<i32> {
        let id: i32 = sqlx::query_scalar(&format!(
            r#"
            INSERT INTO {} (sync_type, start_time, status, records_processed)
            VALUES ($1, CURRENT_TIMESTAMP, $2, 0)
            RETURNING id
            "#,
            self.table
        ))
        .bind(sync_type.as_str())
        .bind(SyncStatus::Running.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn finish(
        &self,
        id: i32,
        status: SyncStatus,
        records_processed: i32,
        error_message: Option<&str>,
    ) -> SyncResult<bool> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET end_time = CURRENT_TIMESTAMP,
                status = $2,
                records_processed = $3,
                error_message = $4
            WHERE id = $1 AND status = $5
            "#,
            self.table
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(records_processed)
        .bind(error_message)
        .bind(SyncStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn recent(&self, filter: Option<SyncType>, limit: i64) -> SyncResult<Vec<SyncLogEntry>> {
        let select = format!(
            r#"
            SELECT id, sync_type, start_time, end_time, status,
                   COALESCE(records_processed, 0) AS records_processed,
                   error_message
            FROM {}
            "#,
            self.table
        );

        let rows: Vec<LogRow> = match filter {
            Some(sync_type) => {
                sqlx::query_as(&format!(
                    "{} WHERE sync_type = $1 ORDER BY start_time DESC, id DESC LIMIT $2",
                    select
                ))
                .bind(sync_type.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            },
            None => {
                sqlx::query_as(&format!(
                    "{} ORDER BY start_time DESC, id DESC LIMIT $1",
                    select
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            },
        };

        rows.into_iter().map(SyncLogEntry::try_from).collect()
    }
}
