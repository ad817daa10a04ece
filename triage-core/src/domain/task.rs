//! Task configuration types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::run::RunId;

/// A named pipeline definition: one source, one analyzer, any number of sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub source: PluginSpec,
    pub analyzer: PluginSpec,
    #[serde(default)]
    pub sinks: Vec<PluginSpec>,
}

/// Plugin selection by name plus its opaque parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl PluginSpec {
    /// Creates a plugin spec with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Builder-style parameter setter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Provenance handed to analyzers and sinks so a report can describe itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub task_name: String,
    pub run_id: RunId,
    pub label: String,
    /// `%Y%m%d_%H%M%S` stamp shared by the report key and sink paths
    pub timestamp: String,
    pub started_at: DateTime<Utc>,
}
