//! Data sources
//!
//! A source produces raw operational data for one backend. Recoverable
//! conditions (missing container, empty result set) yield empty output;
//! connectivity failures surface as [`SourceError::Connection`].

pub mod docker;
pub mod file;
pub mod multi;
pub mod mysql;
pub mod postgres;
pub mod redis;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::SourceError;

pub use docker::DockerSource;
pub use file::FileSource;
pub use multi::{CallEdge, MultiSource};
pub use mysql::MySqlSource;
pub use postgres::PostgresSource;
pub use self::redis::RedisSource;

/// What a successful connection test learned about the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Backend name, e.g. `PostgreSQL`
    pub database_type: String,
    pub version: Option<String>,
}

/// Output of one `collect()` call
#[derive(Debug, Clone, PartialEq)]
pub enum Collected {
    /// One text blob
    Text(String),
    /// Individual lines, joined with `\n` before analysis
    Lines(Vec<String>),
    /// A structured dataset analysed as one JSON document
    Structured(Value),
}

impl Collected {
    /// Text form of line-oriented output; `None` for structured data
    pub fn into_text(self) -> Option<String> {
        match self {
            Collected::Text(text) => Some(text),
            Collected::Lines(lines) => Some(lines.join("\n")),
            Collected::Structured(_) => None,
        }
    }

    /// Collapses `Lines` into a single `Text` unit
    pub fn flatten(self) -> Self {
        match self {
            Collected::Lines(lines) => Collected::Text(lines.join("\n")),
            other => other,
        }
    }

    /// Whether nothing was collected
    pub fn is_empty(&self) -> bool {
        match self {
            Collected::Text(text) => text.trim().is_empty(),
            Collected::Lines(lines) => lines.iter().all(|l| l.trim().is_empty()),
            Collected::Structured(value) => value.is_null(),
        }
    }
}

/// Capability to collect raw data from one backend
#[async_trait]
pub trait Source: Send + Sync {
    /// Registry name of this source type
    fn kind(&self) -> &'static str;

    /// Collects data
    ///
    /// Connections opened here are owned by this call and closed before it
    /// returns, on both success and failure.
    async fn collect(&self) -> Result<Collected, SourceError>;

    /// Opens and closes a connection without collecting anything
    ///
    /// Only database sources support this.
    async fn test_connection(&self) -> Result<ServerInfo, SourceError> {
        Err(SourceError::Unsupported(self.kind().to_string()))
    }
}

/// Builds a line-oriented source usable inside an aggregator
///
/// # Arguments
/// * `kind` - `docker` or `file`
/// * `params` - The sub-source parameters
pub fn create_leaf_source(
    kind: &str,
    params: &Map<String, Value>,
) -> anyhow::Result<Box<dyn Source>> {
    match kind {
        "docker" => Ok(Box::new(DockerSource::from_params(params)?)),
        "file" => Ok(Box::new(FileSource::from_params(params)?)),
        other => anyhow::bail!("unsupported sub-source type '{}'", other),
    }
}
