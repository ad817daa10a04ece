use serde::{Deserialize, Serialize};

use crate::domain::task::TaskConfig;

/// Task listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub name: String,
    pub source: String,
    pub analyzer: String,
    pub sinks: Vec<String>,
}

impl From<&TaskConfig> for TaskSummary {
    fn from(task: &TaskConfig) -> Self {
        Self {
            name: task.name.clone(),
            source: task.source.name.clone(),
            analyzer: task.analyzer.name.clone(),
            sinks: task.sinks.iter().map(|s| s.name.clone()).collect(),
        }
    }
}
