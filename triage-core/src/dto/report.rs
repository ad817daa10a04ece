//! Report DTOs

use serde::{Deserialize, Serialize};

/// Filters for listing reports
///
/// `start_time`/`end_time` are compared as strings against the
/// `%Y-%m-%dT%H:%M:%S` rendering of the creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportQuery {
    #[serde(alias = "container_name")]
    pub label: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub limit: Option<usize>,
}
