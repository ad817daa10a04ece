//! Run domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-unique, monotonically increasing run identifier
pub type RunId = u64;

/// One execution of a task
///
/// Created in `Running`/`Queued` when a task is launched and mutated in place
/// by the worker executing it until it reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub task_name: String,
    /// Container or database label, when the run targets one
    pub label: Option<String>,
    pub status: RunStatus,
    pub stage: RunStage,
    pub progress: Progress,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Key of the report produced by this run, if any
    pub report_id: Option<String>,
}

impl Run {
    /// Creates a freshly launched run in `Running`/`Queued`
    pub fn new(id: RunId, task_name: impl Into<String>, label: Option<String>) -> Self {
        Self {
            id,
            task_name: task_name.into(),
            label,
            status: RunStatus::Running,
            stage: RunStage::Queued,
            progress: Progress::default(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
            report_id: None,
        }
    }

    /// Whether the run reached `Completed` or `Failed`
    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }
}

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Pipeline stage a run is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    Queued,
    Collecting,
    Analyzing,
    Saving,
    Finished,
    Failed,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStage::Queued => "queued",
            RunStage::Collecting => "collecting",
            RunStage::Analyzing => "analyzing",
            RunStage::Saving => "saving",
            RunStage::Finished => "finished",
            RunStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Run progress
///
/// The chunk counters are only populated by chunked analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 0 to 100
    pub percentage: u8,
    pub total_chunks: Option<usize>,
    pub processed_chunks: Option<usize>,
}

impl Progress {
    /// Progress for `processed` out of `total` analyzed chunks
    pub fn chunks(total: usize, processed: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((processed.min(total) * 100) / total) as u8
        };
        Self {
            percentage,
            total_chunks: Some(total),
            processed_chunks: Some(processed),
        }
    }

    /// Progress of a finished run
    pub fn complete(self) -> Self {
        Self {
            percentage: 100,
            ..self
        }
    }
}
