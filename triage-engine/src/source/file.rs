//! Plain log file source

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{Collected, Source};
use crate::error::SourceError;
use crate::params::Params;

/// Reads a log file line by line
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Builds the source from `path` (or `file_path`)
    pub fn from_params(params: &Map<String, Value>) -> anyhow::Result<Self> {
        let p = Params::new(params);
        let path = p
            .string("path")
            .or_else(|| p.string("file_path"))
            .filter(|s| !s.is_empty())
            .context("file source requires 'path'")?;
        Ok(Self::new(path))
    }
}

#[async_trait]
impl Source for FileSource {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn collect(&self) -> Result<Collected, SourceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Log file not found: {}", self.path.display());
                return Ok(Collected::Lines(Vec::new()));
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read {}", self.path.display()))
                    .into());
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        info!("Read {} lines from {}", lines.len(), self.path.display());

        Ok(Collected::Lines(lines))
    }
}
