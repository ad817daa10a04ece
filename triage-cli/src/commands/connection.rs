//! Connection test command

use anyhow::{Result, bail};
use colored::*;
use std::sync::Arc;
use triage_engine::{StandardFactory, TaskExecutor};

use crate::config::Config;

/// Connects to a task's data source and prints the server version
pub async fn handle_test_connection_command(task: String, config: &Config) -> Result<()> {
    let catalog = config.load_catalog()?;
    let executor = TaskExecutor::new(catalog, Arc::new(StandardFactory::default()));

    let result = executor.test_task_connection(&task).await?;
    if !result.is_success() {
        bail!(
            "{} ({}): {}",
            result.message,
            result.database_type,
            result.error.unwrap_or_default()
        );
    }

    println!(
        "{} {} {}",
        "✓".green(),
        result.database_type.bold(),
        result.version.as_deref().unwrap_or("(unknown version)")
    );
    Ok(())
}
