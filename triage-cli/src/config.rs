//! Configuration module
//!
//! Locates and loads the task catalog for CLI commands.

use anyhow::{Context, Result};
use std::path::Path;
use triage_engine::TaskCatalog;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the task catalog
    pub catalog_path: String,
}

impl Config {
    /// Loads and validates the catalog
    pub fn load_catalog(&self) -> Result<TaskCatalog> {
        let catalog = TaskCatalog::load(&self.catalog_path)
            .with_context(|| format!("Failed to load task catalog from {}", self.catalog_path))?;
        catalog.validate().context("Invalid task catalog")?;
        Ok(catalog)
    }

    /// Loads the catalog, or an empty one when the file does not exist
    pub fn load_catalog_or_empty(&self) -> Result<TaskCatalog> {
        if Path::new(&self.catalog_path).exists() {
            self.load_catalog()
        } else {
            Ok(TaskCatalog::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_catalog_is_empty() {
        let config = Config {
            catalog_path: "/nonexistent/triage.toml".into(),
        };
        assert!(config.load_catalog().is_err());
        assert!(config.load_catalog_or_empty().unwrap().tasks.is_empty());
    }

    #[test]
    fn test_loads_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.toml");
        std::fs::write(
            &path,
            "[[tasks]]\nname = \"logs\"\nsource = { name = \"docker\" }\nanalyzer = { name = \"chunked_llm\" }\n",
        )
        .unwrap();

        let config = Config {
            catalog_path: path.display().to_string(),
        };
        assert_eq!(config.load_catalog().unwrap().task_names(), vec!["logs"]);
    }
}
