//! Engine error types

use thiserror::Error;

/// Errors surfaced by the task executor to its callers
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Neither an override nor a catalog entry exists for the task
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A plugin could not be created from its configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The worker thread for a run could not be started
    #[error("Failed to start run: {0}")]
    Spawn(String),
}

/// Errors raised by a source while collecting
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backend could not be reached
    ///
    /// The executor still produces an error report for this class.
    #[error("{0}")]
    Connection(String),

    /// An aggregator was configured without any usable sub-source
    #[error("No valid sources could be created")]
    NoValidSources,

    /// The source cannot perform the requested operation
    #[error("Source '{0}' does not support connection tests")]
    Unsupported(String),

    /// Misconfiguration or any other unexpected failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SourceError {
    /// Check if this is a connectivity failure
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Errors raised by a sink while persisting a report
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Invalid sink configuration: {0}")]
    Config(String),
}
