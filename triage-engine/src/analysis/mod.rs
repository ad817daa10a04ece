//! Analysis engine
//!
//! Turns collected data into report text through an LLM. Analyzers never
//! fail: every error is absorbed and represented in the returned report.

pub mod chunked;
pub mod layout;
pub mod prompts;
pub mod structured;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use triage_core::domain::task::ReportMetadata;

use crate::source::Collected;

pub use chunked::{AnalysisMode, ChunkedAnalyzer, ChunkedSettings};
pub use structured::{StructuredAnalyzer, StructuredSettings};

/// Receives chunk progress from an analyzer
pub trait ProgressReporter: Send + Sync {
    /// Called with the total chunk count and the number finished so far
    fn report(&self, total: usize, processed: usize);
}

/// Reporter that discards progress
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _total: usize, _processed: usize) {}
}

/// Capability to turn collected data into report text
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Records provenance used when rendering reports
    fn set_metadata(&mut self, metadata: ReportMetadata);

    /// Provenance set by [`Analyzer::set_metadata`], if any
    fn metadata(&self) -> Option<&ReportMetadata>;

    /// Analyses `data`; failures are returned as report content
    async fn analyze(&self, data: Collected, progress: Arc<dyn ProgressReporter>) -> String;

    /// Renders a report for a run whose data collection failed
    ///
    /// # Arguments
    /// * `message` - What went wrong
    /// * `data` - Whatever is known about the source (type, host, errors)
    fn error_report(&self, message: &str, data: &Value) -> String {
        render_error_report(self.metadata(), message, data)
    }
}

/// Generic failure report shared by analyzers without a custom layout
pub fn render_error_report(
    metadata: Option<&ReportMetadata>,
    message: &str,
    data: &Value,
) -> String {
    let source_type = data
        .get("database_type")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    let host = data.get("host").and_then(Value::as_str).unwrap_or("Unknown");
    let (task, label) = metadata
        .map(|m| (m.task_name.as_str(), m.label.as_str()))
        .unwrap_or(("Unknown", "all"));

    format!(
        "# 📊 Analysis Report

> **Generated at**: {now}  
> **Task**: {task}  
> **Target**: {label}  
> **Source type**: {source_type}  
> **Source address**: {host}  
> **Status**: ❌ Analysis failed

---

## ⚠️ Error

{message}

---

**Note**: no analysis was performed because the data could not be collected.
",
        now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
    )
}
