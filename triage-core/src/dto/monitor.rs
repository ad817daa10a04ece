//! Scheduled monitoring DTOs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Current monitoring schedule as reported by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub enabled: bool,
    /// Task launched on every tick
    pub task: String,
    /// Upper bound between two reports, in seconds
    pub report_interval: u64,
    pub report_interval_hours: f64,
    /// Local hour of day the report is produced at
    pub report_hour: u32,
    /// Next scheduled report, local time
    pub next_report_time: NaiveDateTime,
    pub containers: Vec<String>,
    pub hours_ago: u64,
}
