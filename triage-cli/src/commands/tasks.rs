//! Task listing

use anyhow::Result;
use colored::*;
use triage_core::dto::task::TaskSummary;

use crate::config::Config;

pub fn handle_tasks_command(config: &Config) -> Result<()> {
    let catalog = config.load_catalog()?;

    if catalog.tasks.is_empty() {
        println!("{}", "No tasks configured.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} task(s):", catalog.tasks.len()).bold());
    println!();
    for task in catalog.tasks.iter().map(TaskSummary::from) {
        println!("  {} {}", "▸".cyan(), task.name.bold());
        println!("    Source:   {}", task.source);
        println!("    Analyzer: {}", task.analyzer);
        if task.sinks.is_empty() {
            println!("    Sinks:    {}", "none".dimmed());
        } else {
            println!("    Sinks:    {}", task.sinks.join(", "));
        }
        println!();
    }

    Ok(())
}
