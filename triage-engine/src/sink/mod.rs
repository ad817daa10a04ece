//! Report sinks
//!
//! A sink persists a finished report somewhere and tells the executor where
//! it landed. Sinks are independent: one failing never stops the others.

pub mod file;
pub mod memory;
pub mod object;

use async_trait::async_trait;
use triage_core::domain::task::ReportMetadata;

use crate::error::SinkError;

pub use file::FileSink;
pub use memory::{MemorySink, ReportStore};
pub use object::ObjectSink;

/// Which report field a sink's location is recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Recorded as `file_path`
    File,
    /// Recorded as `object_path`
    Object,
    /// Not recorded
    Memory,
}

/// Capability to persist report text
#[async_trait]
pub trait Sink: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// Persists `report`
    ///
    /// # Returns
    /// The location written to, if the sink has one
    async fn save(&self, report: &str, metadata: &ReportMetadata)
    -> Result<Option<String>, SinkError>;
}

/// Base file name shared by sinks: `{timestamp}_{label}`
pub fn report_stem(metadata: &ReportMetadata) -> String {
    format!("{}_{}", metadata.timestamp, sanitize(&metadata.label))
}

/// Replaces characters that would create extra path segments
pub(crate) fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

#[cfg(test)]
pub(crate) fn test_metadata(label: &str) -> ReportMetadata {
    ReportMetadata {
        task_name: "errors".into(),
        run_id: 1,
        label: label.into(),
        timestamp: "20240102_030405".into(),
        started_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_stem_sanitizes_label() {
        assert_eq!(report_stem(&test_metadata("web")), "20240102_030405_web");
        assert_eq!(report_stem(&test_metadata("a/b:c")), "20240102_030405_a_b_c");
    }
}
