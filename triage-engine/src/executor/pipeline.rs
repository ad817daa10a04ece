//! Per-run pipeline
//!
//! Collect, analyse, save, record. Runs on the run's own worker and is the
//! only writer of its [`RunCell`].

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};
use triage_core::domain::report::{REPORT_TIMESTAMP_FORMAT, Report};
use triage_core::domain::run::{Progress, RunStage, RunStatus};
use triage_core::domain::task::{PluginSpec, ReportMetadata, TaskConfig};

use super::factory::ComponentFactory;
use super::registry::{ReportRegistry, RunCell, update_run};
use crate::analysis::{ProgressReporter, render_error_report};
use crate::error::SourceError;
use crate::params::Params;
use crate::sink::SinkKind;
use crate::source::Collected;

/// Everything a worker needs to drive one run
pub(crate) struct RunJob {
    pub run: RunCell,
    pub task: TaskConfig,
    pub label: Option<String>,
    pub factory: Arc<dyn ComponentFactory>,
    pub reports: Arc<ReportRegistry>,
}

/// Percentage reported while collecting
const COLLECTING_PERCENT: u8 = 10;
/// Percentage reported when analysis starts
const ANALYZING_PERCENT: u8 = 50;
/// Percentage reported while saving
const SAVING_PERCENT: u8 = 90;

/// Writes chunk progress into the run
///
/// The chunk ratio is spread over the analyzing band so the percentage never
/// moves backwards.
struct RunProgress {
    run: RunCell,
}

impl ProgressReporter for RunProgress {
    fn report(&self, total: usize, processed: usize) {
        update_run(&self.run, |run| run.progress = analysis_progress(total, processed));
    }
}

fn analysis_progress(total: usize, processed: usize) -> Progress {
    let mut progress = Progress::chunks(total, processed);
    let band = u16::from(SAVING_PERCENT - ANALYZING_PERCENT);
    progress.percentage = ANALYZING_PERCENT + (u16::from(progress.percentage) * band / 100) as u8;
    progress
}

/// Drives a run to a terminal state
pub(crate) async fn run(job: RunJob) {
    let run_id = job.run.read().map(|r| r.id).unwrap_or_default();
    if let Err(e) = execute(&job).await {
        error!("Run {} failed: {:#}", run_id, e);
        mark_failed(&job.run, format!("{:#}", e), None);
    }
}

/// Marks a run failed, optionally pointing at an error report
pub(crate) fn mark_failed(run: &RunCell, message: String, report_id: Option<String>) {
    update_run(run, |run| {
        run.status = RunStatus::Failed;
        run.stage = RunStage::Failed;
        run.error = Some(message);
        run.report_id = report_id;
        run.finished_at = Some(Utc::now());
    });
}

/// Moves a run to `stage` and its percentage to the stage's floor
fn set_stage(run: &RunCell, stage: RunStage) {
    update_run(run, |run| {
        run.stage = stage;
        if let Some(percentage) = stage_percentage(stage) {
            run.progress.percentage = percentage;
        }
    });
}

fn stage_percentage(stage: RunStage) -> Option<u8> {
    match stage {
        RunStage::Collecting => Some(COLLECTING_PERCENT),
        RunStage::Analyzing => Some(ANALYZING_PERCENT),
        RunStage::Saving => Some(SAVING_PERCENT),
        _ => None,
    }
}

async fn execute(job: &RunJob) -> Result<()> {
    let (run_id, started_at) = {
        let run = job.run.read().map_err(|_| anyhow::anyhow!("run state poisoned"))?;
        (run.id, run.started_at)
    };
    info!("Run {} started for task '{}'", run_id, job.task.name);

    set_stage(&job.run, RunStage::Collecting);
    let source = job.factory.create_source(&job.task.source)?;
    let collected = match source.collect().await {
        Ok(data) => data.flatten(),
        Err(SourceError::Connection(message)) => {
            return report_connection_failure(job, run_id, started_at, &message).await;
        }
        Err(e) => return Err(e).context("Data collection failed"),
    };

    set_stage(&job.run, RunStage::Analyzing);
    let metadata = ReportMetadata {
        task_name: job.task.name.clone(),
        run_id,
        label: resolve_label(job.label.as_deref(), &job.task.source, Some(&collected)),
        timestamp: Utc::now().format(REPORT_TIMESTAMP_FORMAT).to_string(),
        started_at,
    };
    let mut analyzer = job.factory.create_analyzer(&job.task.analyzer)?;
    analyzer.set_metadata(metadata.clone());

    let progress = Arc::new(RunProgress {
        run: Arc::clone(&job.run),
    });
    let content = analyzer.analyze(collected, progress).await;

    set_stage(&job.run, RunStage::Saving);
    let report_id = save_and_record(job, &metadata, content).await;

    update_run(&job.run, |run| {
        run.status = RunStatus::Completed;
        run.stage = RunStage::Finished;
        run.progress = std::mem::take(&mut run.progress).complete();
        run.report_id = Some(report_id.clone());
        run.finished_at = Some(Utc::now());
    });
    info!("Run {} completed with report {}", run_id, report_id);
    Ok(())
}

/// Produces, saves and records an error report for an unreachable source
///
/// The run still ends failed.
async fn report_connection_failure(
    job: &RunJob,
    run_id: u64,
    started_at: chrono::DateTime<Utc>,
    message: &str,
) -> Result<()> {
    warn!("Run {}: data source unreachable: {}", run_id, message);
    let metadata = ReportMetadata {
        task_name: job.task.name.clone(),
        run_id,
        label: resolve_label(job.label.as_deref(), &job.task.source, None),
        timestamp: Utc::now().format(REPORT_TIMESTAMP_FORMAT).to_string(),
        started_at,
    };
    let headline = format!("Data source connection failed: {}", message);
    let data = source_error_data(&job.task.source, message);

    let content = match job.factory.create_analyzer(&job.task.analyzer) {
        Ok(mut analyzer) => {
            analyzer.set_metadata(metadata.clone());
            analyzer.error_report(&headline, &data)
        }
        Err(e) => {
            warn!("Run {}: analyzer unavailable for error report: {}", run_id, e);
            render_error_report(Some(&metadata), &headline, &data)
        }
    };

    set_stage(&job.run, RunStage::Saving);
    let report_id = save_and_record(job, &metadata, content).await;
    mark_failed(&job.run, headline, Some(report_id));
    Ok(())
}

/// What is known about a source that could not be reached
fn source_error_data(spec: &PluginSpec, message: &str) -> Value {
    let p = Params::new(&spec.params);
    json!({
        "database_type": spec.name,
        "host": p.string_or("host", "Unknown"),
        "port": p.string_or("port", "Unknown"),
        "database": p.string_or("database", "all"),
        "errors": [message],
    })
}

/// Report label: explicit, then structured `database`, then container, then `all`
fn resolve_label(explicit: Option<&str>, source: &PluginSpec, data: Option<&Collected>) -> String {
    if let Some(label) = explicit.filter(|l| !l.is_empty()) {
        return label.to_string();
    }
    if let Some(Collected::Structured(value)) = data {
        if let Some(database) = value.get("database").and_then(Value::as_str) {
            return database.to_string();
        }
    }
    let p = Params::new(&source.params);
    p.string("container_name")
        .or_else(|| p.string("database"))
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "all".to_string())
}

/// Runs every configured sink and records the report
///
/// Sink failures are logged and skipped.
async fn save_and_record(job: &RunJob, metadata: &ReportMetadata, content: String) -> String {
    let mut file_path = None;
    let mut object_path = None;

    for spec in &job.task.sinks {
        let sink = match job.factory.create_sink(spec) {
            Ok(Some(sink)) => sink,
            Ok(None) => {
                warn!("Unknown sink '{}', skipping", spec.name);
                continue;
            }
            Err(e) => {
                warn!("Sink '{}' could not be created: {}", spec.name, e);
                continue;
            }
        };

        match sink.save(&content, metadata).await {
            Ok(Some(location)) => match sink.kind() {
                SinkKind::File => file_path = Some(location),
                SinkKind::Object => object_path = Some(location),
                SinkKind::Memory => {}
            },
            Ok(None) => {}
            Err(e) => error!("Sink '{}' failed: {}", spec.name, e),
        }
    }

    let base = format!("{}_{}", metadata.timestamp, metadata.label);
    job.reports.insert_unique(
        &base,
        Report {
            id: base.clone(),
            run_id: metadata.run_id,
            task_name: metadata.task_name.clone(),
            label: metadata.label.clone(),
            content,
            file_path,
            object_path,
            created_at: Utc::now(),
            timestamp: metadata.timestamp.clone(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::domain::run::Run;

    #[test]
    fn test_label_resolution() {
        let docker = PluginSpec::new("docker").with_param("container_name", "web");
        let postgres = PluginSpec::new("postgres").with_param("host", "db");

        assert_eq!(resolve_label(Some("explicit"), &docker, None), "explicit");
        assert_eq!(resolve_label(None, &docker, None), "web");
        assert_eq!(resolve_label(None, &postgres, None), "all");

        let data = Collected::Structured(json!({ "database": "orders" }));
        assert_eq!(resolve_label(None, &postgres, Some(&data)), "orders");
    }

    #[test]
    fn test_stage_percentage_without_chunks() {
        let run: RunCell = Arc::new(std::sync::RwLock::new(Run::new(1, "db", None)));

        set_stage(&run, RunStage::Collecting);
        assert_eq!(run.read().unwrap().progress.percentage, 10);
        set_stage(&run, RunStage::Analyzing);
        assert_eq!(run.read().unwrap().progress.percentage, 50);
        set_stage(&run, RunStage::Saving);
        assert_eq!(run.read().unwrap().progress.percentage, 90);
    }

    #[test]
    fn test_chunk_progress_stays_within_analyzing_band() {
        let run: RunCell = Arc::new(std::sync::RwLock::new(Run::new(1, "logs", None)));
        let reporter = RunProgress {
            run: Arc::clone(&run),
        };
        set_stage(&run, RunStage::Analyzing);

        let mut seen = vec![run.read().unwrap().progress.percentage];
        for processed in 0..=4 {
            reporter.report(4, processed);
            seen.push(run.read().unwrap().progress.percentage);
        }
        set_stage(&run, RunStage::Saving);
        seen.push(run.read().unwrap().progress.percentage);

        assert_eq!(seen, vec![50, 50, 60, 70, 80, 90, 90]);
        let progress = run.read().unwrap().progress.clone();
        assert_eq!(progress.total_chunks, Some(4));
        assert_eq!(progress.processed_chunks, Some(4));
    }

    #[test]
    fn test_source_error_data() {
        let spec = PluginSpec::new("postgres")
            .with_param("host", "10.0.0.9")
            .with_param("port", 5433);
        let data = source_error_data(&spec, "db unreachable");
        assert_eq!(data["host"], "10.0.0.9");
        assert_eq!(data["port"], "5433");
        assert_eq!(data["errors"][0], "db unreachable");
    }
}
