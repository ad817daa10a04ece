//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod connection;
mod run;
mod tasks;
mod validate;

pub use run::RunArgs;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a task and wait for its report
    Run(RunArgs),
    /// List configured tasks
    Tasks,
    /// Check the task catalog
    Validate,
    /// Connect to a task's data source without running it
    TestConnection {
        /// Task name from the catalog
        task: String,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run(args) => run::handle_run_command(args, config).await,
        Commands::Tasks => tasks::handle_tasks_command(config),
        Commands::Validate => validate::handle_validate_command(config),
        Commands::TestConnection { task } => {
            connection::handle_test_connection_command(task, config).await
        }
    }
}
