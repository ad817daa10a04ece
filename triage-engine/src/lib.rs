//! Triage engine
//!
//! Collects telemetry from configured sources, analyses it with an LLM and
//! persists the resulting reports. Runs are tracked in process memory by the
//! [`TaskExecutor`].

pub mod analysis;
pub mod chunk;
pub mod config;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod overrides;
pub mod params;
pub mod sink;
pub mod source;

#[cfg(test)]
mod testing;

pub use config::TaskCatalog;
pub use error::{ExecutorError, SinkError, SourceError};
pub use executor::{ComponentFactory, StandardFactory, TaskExecutor};
pub use monitor::Monitor;
pub use sink::ReportStore;
