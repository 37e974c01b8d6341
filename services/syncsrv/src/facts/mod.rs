//! Fact datasets extracted from the operational database
//!
//! Each dataset is a fixed SQL query plus a typed row. Rows are flattened
//! into [`RowSet`]s of [`Cell`]s so the upsert engine can stay generic over
//! columns.

pub mod delivery;
pub mod order;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use errors::{SyncError, SyncResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use delivery::FactDeliveryRow;
pub use order::FactOrderRow;

/// One nullable, typed value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Text(Option<String>),
    Date(Option<NaiveDate>),
    Timestamp(Option<NaiveDateTime>),
    TimestampTz(Option<DateTime<Utc>>),
    Time(Option<NaiveTime>),
    Numeric(Option<Decimal>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        match self {
            Self::Text(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
            Self::TimestampTz(v) => v.is_none(),
            Self::Time(v) => v.is_none(),
            Self::Numeric(v) => v.is_none(),
        }
    }

    pub fn text(value: &str) -> Self {
        Self::Text(Some(value.to_string()))
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(Some(v)) => write!(f, "{}", v),
            Self::Date(Some(v)) => write!(f, "{}", v),
            Self::Timestamp(Some(v)) => write!(f, "{}", v),
            Self::TimestampTz(Some(v)) => write!(f, "{}", v),
            Self::Time(Some(v)) => write!(f, "{}", v),
            Self::Numeric(Some(v)) => write!(f, "{}", v),
            _ => f.write_str("NULL"),
        }
    }
}

/// Ordered columns plus rows of cells, one cell per column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from typed fact rows
    pub fn from_facts<R: FactRow>(rows: Vec<R>) -> Self {
        Self {
            columns: R::COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: rows.into_iter().map(FactRow::into_cells).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a row, rejecting a width mismatch
    pub fn push(&mut self, row: Vec<Cell>) -> SyncResult<()> {
        if row.len() != self.columns.len() {
            return Err(SyncError::Validation(format!(
                "row has {} cells, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }
}

/// A typed row of one fact dataset
pub trait FactRow: Send + Sync + 'static {
    /// Dataset name used in logs and errors
    const DATASET: &'static str;
    /// Target table in the warehouse
    const TABLE: &'static str;
    /// Output columns, in query order
    const COLUMNS: &'static [&'static str];
    /// Unique key in the target table
    const KEY_COLUMNS: &'static [&'static str];

    fn into_cells(self) -> Vec<Cell>;
}

/// Inclusive date window for extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> SyncResult<Self> {
        let range = Self { from, to };
        range.check()?;
        Ok(range)
    }

    /// First of the month containing `today` through `today`
    pub fn current_month(today: NaiveDate) -> Self {
        Self {
            from: today.with_day(1),
            to: Some(today),
        }
    }

    /// Fill open ends: `default_from` and `today`
    pub fn resolve(
        &self,
        today: NaiveDate,
        default_from: NaiveDate,
    ) -> SyncResult<(NaiveDate, NaiveDate)> {
        self.check()?;
        let from = self.from.unwrap_or(default_from);
        let to = self.to.unwrap_or(today);
        Ok((from, to))
    }

    fn check(&self) -> SyncResult<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(SyncError::Validation(format!(
                    "date range start {} is after end {}",
                    from, to
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "*".into());
        write!(f, "{}..{}", show(self.from), show(self.to))
    }
}

/// Map a row decode failure to a query error for `dataset`
pub(crate) fn decode_error(dataset: &str, err: sqlx::Error) -> SyncError {
    SyncError::query(dataset, err)
}
