//! Run DTOs

use serde::{Deserialize, Serialize};

use crate::domain::run::RunId;

/// Per-launch adjustments applied to a copy of a task configuration
///
/// Time and limit fields target docker sources; `chunk_size` and
/// `concurrency` target the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOverrides {
    /// Restrict the run to this single container
    #[serde(alias = "container_name")]
    pub container: Option<String>,
    pub minutes_ago: Option<u64>,
    pub hours_ago: Option<u64>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub tail: Option<u64>,
    pub max_lines: Option<u64>,
    pub max_bytes: Option<u64>,
    pub chunk_size: Option<u64>,
    pub concurrency: Option<u64>,
}

impl RunOverrides {
    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Response to a task launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchedRun {
    pub run_id: RunId,
    pub task_name: String,
    /// Container label, or `all`
    pub label: String,
}
