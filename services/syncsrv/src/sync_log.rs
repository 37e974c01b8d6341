//! Sync run records
//!
//! A run opens a RUNNING entry and closes it exactly once as SUCCESS or
//! FAILED. The log table is the only durable operational record.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// Longest error text stored in a log entry
pub const MAX_ERROR_MESSAGE_LEN: usize = 4000;

/// Dataset selector for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncType {
    #[serde(rename = "fact_order")]
    Order,
    #[serde(rename = "fact_delivery")]
    Delivery,
    #[serde(rename = "both")]
    Both,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "fact_order",
            Self::Delivery => "fact_delivery",
            Self::Both => "both",
        }
    }

    pub fn includes_orders(&self) -> bool {
        matches!(self, Self::Order | Self::Both)
    }

    pub fn includes_deliveries(&self) -> bool {
        matches!(self, Self::Delivery | Self::Both)
    }
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fact_order" | "order" => Ok(Self::Order),
            "fact_delivery" | "delivery" => Ok(Self::Delivery),
            "both" | "all" => Ok(Self::Both),
            other => Err(SyncError::Validation(format!(
                "unknown sync type '{}', expected fact_order, fact_delivery or both",
                other
            ))),
        }
    }
}

/// Lifecycle state of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    Running,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(SyncError::Internal(format!("unknown sync status '{}'", other))),
        }
    }
}

/// One row of the sync log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: i32,
    /// Stored text; rows written by older tooling may hold other values
    pub sync_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub records_processed: i32,
    pub error_message: Option<String>,
}

/// Cap error text at [`MAX_ERROR_MESSAGE_LEN`] characters
pub fn truncate_error(message: &str) -> String {
    truncate_chars(message, MAX_ERROR_MESSAGE_LEN)
}

/// Cut to `max` characters, marking the cut with `...`
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Parse a selector, reporting failures as validation errors
pub fn parse_sync_type(s: &str) -> SyncResult<SyncType> {
    s.parse()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_sync_type_round_trip_names() {
        for t in [SyncType::Order, SyncType::Delivery, SyncType::Both] {
            assert_eq!(t.as_str().parse::<SyncType>().unwrap(), t);
        }
        assert_eq!("order".parse::<SyncType>().unwrap(), SyncType::Order);
        assert_eq!("Delivery".parse::<SyncType>().unwrap(), SyncType::Delivery);
    }

    #[test]
    fn test_unknown_sync_type_is_validation_error() {
        let err = parse_sync_type("weekly").unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_dataset_selection() {
        assert!(SyncType::Both.includes_orders());
        assert!(SyncType::Both.includes_deliveries());
        assert!(!SyncType::Order.includes_deliveries());
        assert!(!SyncType::Delivery.includes_orders());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        assert_eq!(serde_json::to_value(SyncStatus::Success).unwrap(), "SUCCESS");
        assert_eq!("FAILED".parse::<SyncStatus>().unwrap(), SyncStatus::Failed);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate_chars("short", 30), "short");
        let long = "x".repeat(40);
        let cut = truncate_chars(&long, 30);
        assert_eq!(cut.chars().count(), 30);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_error(&"e".repeat(5000)).chars().count(), MAX_ERROR_MESSAGE_LEN);
    }
}
