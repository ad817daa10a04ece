//! Task catalog
//!
//! Loads the declarative task definitions and server settings from a TOML
//! file. The catalog is read once and treated as immutable afterwards.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use triage_core::domain::task::TaskConfig;

/// Environment variable naming the catalog file
pub const CONFIG_ENV: &str = "TRIAGE_CONFIG";

/// Catalog file used when `TRIAGE_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "triage.toml";

/// Default HTTP bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Server section of the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

/// Scheduled report section of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Catalog task launched on every tick
    #[serde(default)]
    pub task: String,
    /// Containers covered by the report; taken from the task when empty
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default = "default_hours_ago")]
    pub hours_ago: u64,
    /// Local hour of day the report is produced at
    #[serde(default = "default_report_hour")]
    pub report_hour: u32,
    /// Upper bound between two reports, in seconds
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            task: String::new(),
            containers: Vec::new(),
            hours_ago: default_hours_ago(),
            report_hour: default_report_hour(),
            report_interval: default_report_interval(),
        }
    }
}

fn default_hours_ago() -> u64 {
    24
}

fn default_report_hour() -> u32 {
    2
}

fn default_report_interval() -> u64 {
    86_400
}

/// All configured tasks plus server settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskCatalog {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl TaskCatalog {
    /// Creates a catalog from already-built task definitions
    pub fn new(tasks: Vec<TaskConfig>) -> Self {
        Self {
            server: ServerConfig::default(),
            monitoring: MonitoringConfig::default(),
            tasks,
        }
    }

    /// Parses a catalog from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse task catalog")
    }

    /// Loads a catalog file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task catalog {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("In {}", path.display()))
    }

    /// Path named by `TRIAGE_CONFIG`, or the default
    pub fn path_from_env() -> String {
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Looks up a task by name
    pub fn get_task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Task names in file order
    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name.clone()).collect()
    }

    /// Validates the catalog
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_addr.is_empty() {
            anyhow::bail!("server.bind_addr cannot be empty");
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.name.is_empty() {
                anyhow::bail!("task name cannot be empty");
            }
            if !seen.insert(task.name.as_str()) {
                anyhow::bail!("duplicate task name '{}'", task.name);
            }
            if task.source.name.is_empty() {
                anyhow::bail!("task '{}' has no source name", task.name);
            }
            if task.analyzer.name.is_empty() {
                anyhow::bail!("task '{}' has no analyzer name", task.name);
            }
        }

        let monitoring = &self.monitoring;
        if monitoring.report_hour > 23 {
            anyhow::bail!(
                "monitoring.report_hour must be 0-23, got {}",
                monitoring.report_hour
            );
        }
        if monitoring.report_interval == 0 {
            anyhow::bail!("monitoring.report_interval must be positive");
        }
        if monitoring.enabled && self.get_task(&monitoring.task).is_none() {
            anyhow::bail!("monitoring task '{}' is not defined", monitoring.task);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
bind_addr = "127.0.0.1:9000"

[monitoring]
enabled = true
task = "apps"
report_hour = 3

[[tasks]]
name = "apps"
[tasks.source]
name = "multi"
params = { sources = [ { type = "docker", container_name = "api", hours_ago = 2 } ] }
[tasks.analyzer]
name = "chunked_llm"
params = { chunk_size = 4000, mode = "sequential" }
[[tasks.sinks]]
name = "file"
params = { output_path = "reports/{timestamp}_{label}.md" }

[[tasks]]
name = "db"
[tasks.source]
name = "postgres"
[tasks.analyzer]
name = "structured_llm"
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = TaskCatalog::from_toml_str(SAMPLE).unwrap();
        assert_eq!(catalog.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(catalog.task_names(), vec!["apps", "db"]);

        let apps = catalog.get_task("apps").unwrap();
        assert_eq!(apps.source.name, "multi");
        assert_eq!(apps.analyzer.params["chunk_size"], 4000);
        assert_eq!(apps.sinks.len(), 1);
        assert_eq!(
            apps.source.params["sources"][0]["container_name"],
            "api"
        );

        let db = catalog.get_task("db").unwrap();
        assert!(db.sinks.is_empty());
        assert!(catalog.validate().is_ok());

        assert!(catalog.monitoring.enabled);
        assert_eq!(catalog.monitoring.task, "apps");
        assert_eq!(catalog.monitoring.report_hour, 3);
        assert_eq!(catalog.monitoring.hours_ago, 24);
        assert_eq!(catalog.monitoring.report_interval, 86_400);
    }

    #[test]
    fn test_default_server_section() {
        let catalog = TaskCatalog::from_toml_str("").unwrap();
        assert_eq!(catalog.server.bind_addr, DEFAULT_BIND_ADDR);
        assert!(catalog.tasks.is_empty());
        assert_eq!(catalog.monitoring, MonitoringConfig::default());
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_monitoring() {
        let mut catalog = TaskCatalog::from_toml_str(SAMPLE).unwrap();
        catalog.monitoring.task = "missing".into();
        assert!(catalog.validate().is_err());

        catalog.monitoring.enabled = false;
        assert!(catalog.validate().is_ok());

        catalog.monitoring.report_hour = 24;
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut catalog = TaskCatalog::from_toml_str(SAMPLE).unwrap();
        let mut dup = catalog.tasks[0].clone();
        dup.analyzer.params.clear();
        catalog.tasks.push(dup);
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_source_name() {
        let mut catalog = TaskCatalog::from_toml_str(SAMPLE).unwrap();
        catalog.tasks[1].source.name.clear();
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let catalog = TaskCatalog::load(file.path()).unwrap();
        assert!(catalog.get_task("db").is_some());
        assert!(catalog.get_task("missing").is_none());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(TaskCatalog::load("/nonexistent/triage.toml").is_err());
    }
}
