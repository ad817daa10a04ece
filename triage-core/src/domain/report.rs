//! Report domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run::RunId;

/// Format of the timestamp embedded in report keys and file names
pub const REPORT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Format used when comparing creation times as strings
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The persisted output of one run
///
/// Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Composite key `{timestamp}_{label}`
    pub id: String,
    pub run_id: RunId,
    pub task_name: String,
    pub label: String,
    pub content: String,
    pub file_path: Option<String>,
    pub object_path: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Timestamp part of the key
    pub timestamp: String,
}

impl Report {
    /// Creation time rendered for lexicographic range comparison
    pub fn created_at_key(&self) -> String {
        self.created_at.format(CREATED_AT_FORMAT).to_string()
    }
}

/// Report listing entry without the content body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: String,
    pub run_id: RunId,
    pub task_name: String,
    pub label: String,
    pub file_path: Option<String>,
    pub object_path: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Timestamp part of the key
    pub timestamp: String,
}

impl From<&Report> for ReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            run_id: report.run_id,
            task_name: report.task_name.clone(),
            label: report.label.clone(),
            file_path: report.file_path.clone(),
            object_path: report.object_path.clone(),
            created_at: report.created_at,
            timestamp: report.timestamp.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report() -> Report {
        Report {
            id: "20240501_103000_api".to_string(),
            run_id: 7,
            task_name: "errors".to_string(),
            label: "api".to_string(),
            content: "# Report".to_string(),
            file_path: Some("/reports/20240501_103000_api.md".to_string()),
            object_path: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap(),
            timestamp: "20240501_103000".to_string(),
        }
    }

    #[test]
    fn test_summary_carries_timestamp_without_content() {
        let summary = ReportSummary::from(&report());
        assert_eq!(summary.timestamp, "20240501_103000");
        assert_eq!(summary.run_id, 7);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["timestamp"], "20240501_103000");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn test_created_at_key() {
        assert_eq!(report().created_at_key(), "2024-05-01T10:30:00");
    }
}
