//! Plugin construction
//!
//! Maps the names used in task configuration to concrete sources, analyzers
//! and sinks. The set of names is closed and resolved at compile time.

use triage_core::domain::task::{PluginSpec, TaskConfig};

use crate::analysis::{Analyzer, ChunkedAnalyzer, StructuredAnalyzer};
use crate::error::ExecutorError;
use crate::sink::{FileSink, MemorySink, ObjectSink, ReportStore, Sink};
use crate::source::{
    DockerSource, FileSource, MultiSource, MySqlSource, PostgresSource, RedisSource, Source,
};

/// Source plugin names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Docker,
    File,
    Postgres,
    MySql,
    Redis,
    Multi,
}

impl SourceKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "docker" | "docker_logs" => Some(Self::Docker),
            "file" => Some(Self::File),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" => Some(Self::MySql),
            "redis" => Some(Self::Redis),
            "multi" => Some(Self::Multi),
            _ => None,
        }
    }
}

/// Analyzer plugin names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    Chunked,
    Structured,
}

impl AnalyzerKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "chunked_llm" | "log_analyzer" => Some(Self::Chunked),
            "structured_llm" | "db_analyzer" => Some(Self::Structured),
            _ => None,
        }
    }
}

/// Builds pipeline components from their configuration
pub trait ComponentFactory: Send + Sync {
    fn create_source(&self, spec: &PluginSpec) -> Result<Box<dyn Source>, ExecutorError>;

    fn create_analyzer(&self, spec: &PluginSpec) -> Result<Box<dyn Analyzer>, ExecutorError>;

    /// Creates a sink, or `None` for a name this factory does not know
    fn create_sink(&self, spec: &PluginSpec) -> Result<Option<Box<dyn Sink>>, ExecutorError>;

    /// Rejects a task whose source or analyzer name is unknown
    ///
    /// Used for offline validation; launches do not call it.
    fn check(&self, _task: &TaskConfig) -> Result<(), ExecutorError> {
        Ok(())
    }
}

/// Factory for the built-in plugins
///
/// Memory sinks write into the injected store.
#[derive(Clone, Default)]
pub struct StandardFactory {
    store: ReportStore,
}

impl StandardFactory {
    pub fn new(store: ReportStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }
}

fn config_error(kind: &str, name: &str, e: impl std::fmt::Display) -> ExecutorError {
    ExecutorError::Config(format!("{} '{}': {:#}", kind, name, e))
}

impl ComponentFactory for StandardFactory {
    fn create_source(&self, spec: &PluginSpec) -> Result<Box<dyn Source>, ExecutorError> {
        let kind = SourceKind::parse(&spec.name).ok_or_else(|| {
            ExecutorError::Config(format!("unknown source '{}'", spec.name))
        })?;
        let params = &spec.params;
        let source: Box<dyn Source> = match kind {
            SourceKind::Docker => Box::new(
                DockerSource::from_params(params)
                    .map_err(|e| config_error("source", &spec.name, e))?,
            ),
            SourceKind::File => Box::new(
                FileSource::from_params(params)
                    .map_err(|e| config_error("source", &spec.name, e))?,
            ),
            SourceKind::Postgres => Box::new(
                PostgresSource::from_params(params)
                    .map_err(|e| config_error("source", &spec.name, e))?,
            ),
            SourceKind::MySql => Box::new(
                MySqlSource::from_params(params)
                    .map_err(|e| config_error("source", &spec.name, e))?,
            ),
            SourceKind::Redis => Box::new(
                RedisSource::from_params(params)
                    .map_err(|e| config_error("source", &spec.name, e))?,
            ),
            SourceKind::Multi => Box::new(
                MultiSource::from_params(params)
                    .map_err(|e| config_error("source", &spec.name, e))?,
            ),
        };
        Ok(source)
    }

    fn create_analyzer(&self, spec: &PluginSpec) -> Result<Box<dyn Analyzer>, ExecutorError> {
        let kind = AnalyzerKind::parse(&spec.name).ok_or_else(|| {
            ExecutorError::Config(format!("unknown analyzer '{}'", spec.name))
        })?;
        let analyzer: Box<dyn Analyzer> = match kind {
            AnalyzerKind::Chunked => Box::new(
                ChunkedAnalyzer::from_params(&spec.params)
                    .map_err(|e| config_error("analyzer", &spec.name, e))?,
            ),
            AnalyzerKind::Structured => Box::new(
                StructuredAnalyzer::from_params(&spec.params)
                    .map_err(|e| config_error("analyzer", &spec.name, e))?,
            ),
        };
        Ok(analyzer)
    }

    fn create_sink(&self, spec: &PluginSpec) -> Result<Option<Box<dyn Sink>>, ExecutorError> {
        let sink: Box<dyn Sink> = match spec.name.as_str() {
            "file" => Box::new(FileSink::from_params(&spec.params)),
            "object" | "minio" => Box::new(
                ObjectSink::from_params(&spec.params)
                    .map_err(|e| config_error("sink", &spec.name, e))?,
            ),
            "memory" => Box::new(MemorySink::new(self.store.clone())),
            _ => return Ok(None),
        };
        Ok(Some(sink))
    }

    fn check(&self, task: &TaskConfig) -> Result<(), ExecutorError> {
        if SourceKind::parse(&task.source.name).is_none() {
            return Err(ExecutorError::Config(format!(
                "unknown source '{}'",
                task.source.name
            )));
        }
        if AnalyzerKind::parse(&task.analyzer.name).is_none() {
            return Err(ExecutorError::Config(format!(
                "unknown analyzer '{}'",
                task.analyzer.name
            )));
        }
        Ok(())
    }
}
