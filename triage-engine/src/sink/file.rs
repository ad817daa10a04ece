//! Local file sink

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;
use triage_core::domain::task::ReportMetadata;

use super::{Sink, SinkKind, sanitize};
use crate::error::SinkError;
use crate::params::Params;

pub const DEFAULT_OUTPUT_PATH: &str = "reports/{timestamp}_{label}.md";

/// Writes reports to a path built from a template
///
/// The template understands `{timestamp}` and `{label}`.
#[derive(Debug, Clone)]
pub struct FileSink {
    template: String,
}

impl FileSink {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Self {
        Self::new(Params::new(params).string_or("output_path", DEFAULT_OUTPUT_PATH))
    }

    fn path_for(&self, metadata: &ReportMetadata) -> PathBuf {
        PathBuf::from(
            self.template
                .replace("{timestamp}", &metadata.timestamp)
                .replace("{label}", &sanitize(&metadata.label)),
        )
    }
}

#[async_trait]
impl Sink for FileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    async fn save(
        &self,
        report: &str,
        metadata: &ReportMetadata,
    ) -> Result<Option<String>, SinkError> {
        let path = self.path_for(metadata);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, report).await?;

        let absolute = tokio::fs::canonicalize(&path).await?;
        let location = absolute.to_string_lossy().to_string();
        info!("Report written to {}", location);
        Ok(Some(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_metadata;

    #[tokio::test]
    async fn test_writes_templated_path() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/out/{{label}}/{{timestamp}}.md", dir.path().display());
        let sink = FileSink::new(template);

        let location = sink
            .save("# report", &test_metadata("web"))
            .await
            .unwrap()
            .unwrap();

        let expected = dir.path().join("out/web/20240102_030405.md");
        assert_eq!(
            PathBuf::from(&location),
            std::fs::canonicalize(&expected).unwrap()
        );
        assert_eq!(std::fs::read_to_string(expected).unwrap(), "# report");
    }

    #[test]
    fn test_default_template() {
        let sink = FileSink::from_params(&Map::new());
        assert_eq!(
            sink.path_for(&test_metadata("db")),
            PathBuf::from("reports/20240102_030405_db.md")
        );
    }

    #[tokio::test]
    async fn test_unwritable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let sink = FileSink::new(format!("{}/sub/{{label}}.md", blocker.display()));

        let err = sink.save("r", &test_metadata("web")).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }
}
