//! Catalog validation

use anyhow::{Result, bail};
use colored::*;
use triage_engine::{ComponentFactory, StandardFactory};

use crate::config::Config;

/// Loads the catalog and checks every task's plugin names
pub fn handle_validate_command(config: &Config) -> Result<()> {
    let catalog = config.load_catalog()?;
    let factory = StandardFactory::default();

    let mut invalid = 0;
    for task in &catalog.tasks {
        match factory.check(task) {
            Ok(()) => println!("  {} {}", "✓".green(), task.name),
            Err(e) => {
                invalid += 1;
                println!("  {} {}: {}", "✗".red(), task.name, e);
            }
        }
    }

    if invalid > 0 {
        bail!("{} task(s) in {} are invalid", invalid, config.catalog_path);
    }

    println!(
        "{} is valid ({} task(s), server on {})",
        config.catalog_path.bold(),
        catalog.tasks.len(),
        catalog.server.bind_addr
    );
    Ok(())
}
