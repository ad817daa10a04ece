//! Triage CLI
//!
//! Runs configured triage tasks in-process and prints their reports.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "LLM-assisted log and database triage", long_about = None)]
struct Cli {
    /// Task catalog file
    #[arg(long, env = "TRIAGE_CONFIG", default_value = "triage.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_cli=warn,triage_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        catalog_path: cli.config,
    };

    handle_command(cli.command, &config).await
}
