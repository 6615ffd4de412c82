//! Import job audit record
//!
//! One `ImportJob` is written per CSV import that reached the write phase.
//! Imports rejected before any write (bad mapping, fail_import with row
//! errors) leave no job behind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    #[serde(rename = "errorsCount")]
    pub errors_count: usize,
}

/// A data row that did not make it into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRow {
    /// 1-based spreadsheet row; the header occupies row 1.
    pub row: usize,
    pub data: Value,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportJobStatus {
    Completed,
    /// A write chunk failed after earlier chunks committed.
    PartiallyFailed,
}

impl ImportJobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
        }
    }
}

impl std::str::FromStr for ImportJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "partially_failed" => Ok(Self::PartiallyFailed),
            other => Err(format!("unknown import job status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,
    pub tenant_id: String,
    pub campaign_id: String,
    pub created_by: String,
    pub file_name: String,
    pub mapping: BTreeMap<String, String>,
    pub stats: ImportStats,
    /// Kept off job listings; the detail view returns it on its own.
    #[serde(skip_serializing, default)]
    pub error_rows: Vec<ErrorRow>,
    pub status: ImportJobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_wire_names() {
        let stats = ImportStats { created: 3, updated: 1, skipped: 2, errors_count: 2 };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["errorsCount"], 2);
        assert!(json.get("errors_count").is_none());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        let status: ImportJobStatus = ImportJobStatus::PartiallyFailed.as_str().parse().unwrap();
        assert_eq!(status, ImportJobStatus::PartiallyFailed);
    }
}
