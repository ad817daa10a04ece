//! Run command
//!
//! Launches a task in-process and follows it until it finishes.

use anyhow::{Result, anyhow, bail};
use clap::Args;
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use triage_core::domain::run::{Run, RunStage, RunStatus};
use triage_core::dto::run::RunOverrides;
use triage_engine::overrides::{apply_overrides, default_container_task};
use triage_engine::{ReportStore, StandardFactory, TaskExecutor};

use crate::config::Config;

/// Arguments of `triage run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Task name from the catalog
    pub task: String,

    /// Analyse this container instead of the configured sources
    #[arg(long)]
    pub container: Option<String>,

    /// Collect logs from the last N minutes
    #[arg(long, conflicts_with = "hours_ago")]
    pub minutes_ago: Option<u64>,

    /// Collect logs from the last N hours
    #[arg(long)]
    pub hours_ago: Option<u64>,

    /// Start of the log window
    #[arg(long)]
    pub since: Option<String>,

    /// End of the log window
    #[arg(long)]
    pub until: Option<String>,

    /// Maximum log lines fetched per container
    #[arg(long)]
    pub tail: Option<u64>,

    /// Chunk size in bytes for the analysis
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Concurrent LLM requests
    #[arg(long)]
    pub concurrency: Option<u64>,

    /// How often to poll the run state
    #[arg(long, default_value_t = 500)]
    pub poll_interval_ms: u64,
}

impl RunArgs {
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides {
            container: self.container.clone(),
            minutes_ago: self.minutes_ago,
            hours_ago: self.hours_ago,
            since: self.since.clone(),
            until: self.until.clone(),
            tail: self.tail,
            chunk_size: self.chunk_size,
            concurrency: self.concurrency,
            ..Default::default()
        }
    }
}

/// Handle `triage run`
///
/// # Arguments
/// * `args` - Parsed run arguments
/// * `config` - The CLI configuration
pub async fn handle_run_command(args: RunArgs, config: &Config) -> Result<()> {
    let catalog = config.load_catalog_or_empty()?;
    let store = ReportStore::new();
    let executor = TaskExecutor::new(catalog, Arc::new(StandardFactory::new(store)));
    let overrides = args.overrides();

    let run_id = if executor.catalog().get_task(&args.task).is_some() {
        executor.launch(&args.task, &overrides)?.run_id
    } else if let Some(container) = &args.container {
        println!(
            "{}",
            format!(
                "Task '{}' is not configured, analysing container '{}' with defaults",
                args.task, container
            )
            .yellow()
        );
        let task = apply_overrides(&default_container_task(container), &overrides);
        executor.execute_task_async(&args.task, Some(task), Some(container.clone()))?
    } else {
        bail!("Task '{}' not found in {}", args.task, config.catalog_path);
    };

    println!("{} Run {} started", "▸".cyan(), run_id.to_string().bold());

    let run = follow_run(&executor, run_id, Duration::from_millis(args.poll_interval_ms)).await?;
    print_outcome(&executor, &run)
}

/// Polls until the run is terminal, printing stage and progress changes
async fn follow_run(executor: &TaskExecutor, run_id: u64, interval: Duration) -> Result<Run> {
    let mut last: Option<(RunStage, u8)> = None;

    loop {
        let run = executor
            .get_run(run_id)
            .ok_or_else(|| anyhow!("Run {} disappeared", run_id))?;

        let current = (run.stage, run.progress.percentage);
        if last != Some(current) {
            print_progress(&run);
            last = Some(current);
        }
        if run.is_terminal() {
            return Ok(run);
        }

        tokio::time::sleep(interval).await;
    }
}

fn print_progress(run: &Run) {
    let label = format!("{:<11}", run.stage.to_string());
    let stage = match run.stage {
        RunStage::Finished => label.green(),
        RunStage::Failed => label.red(),
        _ => label.cyan(),
    };
    match (run.progress.total_chunks, run.progress.processed_chunks) {
        (Some(total), Some(done)) => println!(
            "  {} {:>3}% ({}/{} chunks)",
            stage, run.progress.percentage, done, total
        ),
        _ => println!("  {} {:>3}%", stage, run.progress.percentage),
    }
}

fn print_outcome(executor: &TaskExecutor, run: &Run) -> Result<()> {
    let report = run
        .report_id
        .as_deref()
        .and_then(|id| executor.get_report(id));

    if let Some(report) = &report {
        println!();
        println!("{}", format!("Report {}", report.id).bold());
        if let Some(path) = &report.file_path {
            println!("  File:   {}", path.cyan());
        }
        if let Some(path) = &report.object_path {
            println!("  Object: {}", path.cyan());
        }
        println!("{}", "─".repeat(80).dimmed());
        println!("{}", report.content);
        println!("{}", "─".repeat(80).dimmed());
    }

    if let Some(finished) = run.finished_at {
        let seconds = finished.signed_duration_since(run.started_at).num_seconds();
        println!("  Duration: {}s", seconds);
    }

    match run.status {
        RunStatus::Completed => {
            println!("{} Run {} completed", "✓".green(), run.id);
            Ok(())
        }
        _ => bail!(
            "Run {} failed: {}",
            run.id,
            run.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn test_overrides_from_flags() {
        let cli = TestCli::try_parse_from([
            "triage",
            "logs",
            "--container",
            "api",
            "--minutes-ago",
            "30",
            "--chunk-size",
            "2000",
        ])
        .unwrap();

        let overrides = cli.args.overrides();
        assert_eq!(cli.args.task, "logs");
        assert_eq!(overrides.container.as_deref(), Some("api"));
        assert_eq!(overrides.minutes_ago, Some(30));
        assert_eq!(overrides.chunk_size, Some(2000));
        assert_eq!(overrides.hours_ago, None);
        assert_eq!(cli.args.poll_interval_ms, 500);
    }

    #[test]
    fn test_window_flags_conflict() {
        let result = TestCli::try_parse_from([
            "triage",
            "logs",
            "--minutes-ago",
            "5",
            "--hours-ago",
            "1",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_task_without_container_fails() {
        let config = Config {
            catalog_path: "/nonexistent/triage.toml".into(),
        };
        let args = TestCli::try_parse_from(["triage", "missing"]).unwrap().args;
        let err = handle_run_command(args, &config).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
