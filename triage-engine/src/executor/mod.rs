//! Task executor
//!
//! Owns the run and report registries and launches every run on its own
//! worker thread. Callers get a run id back immediately and poll for status.

pub mod factory;
mod pipeline;
pub mod registry;

use std::sync::Arc;
use tracing::{error, info, warn};
use triage_core::domain::report::{Report, ReportSummary};
use triage_core::domain::run::{Run, RunId};
use triage_core::domain::task::{PluginSpec, TaskConfig};
use triage_core::dto::connection::ConnectionTest;
use triage_core::dto::report::ReportQuery;
use triage_core::dto::run::{LaunchedRun, RunOverrides};

use crate::config::TaskCatalog;
use crate::error::ExecutorError;
use crate::overrides::apply_overrides;

pub use factory::{AnalyzerKind, ComponentFactory, SourceKind, StandardFactory};
pub use registry::{ReportRegistry, RunRegistry};

use pipeline::RunJob;

/// Launches task runs and answers status and report lookups
pub struct TaskExecutor {
    catalog: TaskCatalog,
    factory: Arc<dyn ComponentFactory>,
    runs: RunRegistry,
    reports: Arc<ReportRegistry>,
}

impl TaskExecutor {
    /// Creates an executor over a task catalog
    ///
    /// # Arguments
    /// * `catalog` - Named task definitions
    /// * `factory` - Builds sources, analyzers and sinks from their specs
    pub fn new(catalog: TaskCatalog, factory: Arc<dyn ComponentFactory>) -> Self {
        Self {
            catalog,
            factory,
            runs: RunRegistry::new(),
            reports: Arc::new(ReportRegistry::new()),
        }
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    pub fn task_names(&self) -> Vec<String> {
        self.catalog.task_names()
    }

    /// Starts a run in the background
    ///
    /// `override_config` takes precedence over the catalog entry named
    /// `task_name`. The run is registered before this returns. Plugins are
    /// built on the run's worker, so an unknown source or analyzer ends the
    /// run as failed rather than rejecting the launch.
    ///
    /// # Returns
    /// The new run id, or `TaskNotFound` when neither configuration exists
    pub fn execute_task_async(
        &self,
        task_name: &str,
        override_config: Option<TaskConfig>,
        label: Option<String>,
    ) -> Result<RunId, ExecutorError> {
        let task = match override_config {
            Some(task) => task,
            None => self
                .catalog
                .get_task(task_name)
                .cloned()
                .ok_or_else(|| ExecutorError::TaskNotFound(task_name.to_string()))?,
        };

        let run = self.runs.create(task_name, label.clone());
        let run_id = run.read().map(|r| r.id).unwrap_or_default();
        let job = RunJob {
            run: Arc::clone(&run),
            task,
            label,
            factory: Arc::clone(&self.factory),
            reports: Arc::clone(&self.reports),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("run-{}", run_id))
            .spawn(move || run_on_worker(job));
        if let Err(e) = spawned {
            error!("Failed to spawn worker for run {}: {}", run_id, e);
            pipeline::mark_failed(&run, format!("Failed to start run: {}", e), None);
            return Err(ExecutorError::Spawn(e.to_string()));
        }

        info!("Launched run {} for task '{}'", run_id, task_name);
        Ok(run_id)
    }

    /// Resolves a catalog task, applies overrides and launches it
    ///
    /// The run label is the overridden container, if any.
    pub fn launch(
        &self,
        task_name: &str,
        overrides: &RunOverrides,
    ) -> Result<LaunchedRun, ExecutorError> {
        let task = self
            .catalog
            .get_task(task_name)
            .ok_or_else(|| ExecutorError::TaskNotFound(task_name.to_string()))?;
        let override_config = (!overrides.is_empty()).then(|| apply_overrides(task, overrides));
        let label = overrides.container.clone();

        let run_id = self.execute_task_async(task_name, override_config, label.clone())?;
        Ok(LaunchedRun {
            run_id,
            task_name: task_name.to_string(),
            label: label.unwrap_or_else(|| "all".to_string()),
        })
    }

    pub fn get_run(&self, run_id: RunId) -> Option<Run> {
        self.runs.get(run_id)
    }

    /// Looks a report up by composite key or run id
    pub fn get_report(&self, report_id: &str) -> Option<Report> {
        self.reports.get(report_id)
    }

    pub fn list_reports(&self, query: &ReportQuery) -> Vec<ReportSummary> {
        self.reports.list(query)
    }

    /// Connects to the source described by `spec` without collecting
    ///
    /// Never errors: build and connection problems come back as a failed
    /// test naming the source.
    pub async fn test_source(&self, spec: &PluginSpec) -> ConnectionTest {
        let source = match self.factory.create_source(spec) {
            Ok(source) => source,
            Err(e) => return ConnectionTest::failed(&spec.name, e.to_string()),
        };
        match source.test_connection().await {
            Ok(info) => {
                info!("Connection test for '{}' succeeded", spec.name);
                ConnectionTest::success(info.database_type, info.version)
            }
            Err(e) => {
                warn!("Connection test for '{}' failed: {}", spec.name, e);
                ConnectionTest::failed(&spec.name, e.to_string())
            }
        }
    }

    /// Tests the source of a catalog task
    pub async fn test_task_connection(
        &self,
        task_name: &str,
    ) -> Result<ConnectionTest, ExecutorError> {
        let task = self
            .catalog
            .get_task(task_name)
            .ok_or_else(|| ExecutorError::TaskNotFound(task_name.to_string()))?;
        Ok(self.test_source(&task.source).await)
    }
}

/// Body of a run's worker thread
///
/// The thread owns a single-threaded runtime for the run's I/O. The pipeline
/// is spawned as a task so a panic inside it still ends the run as failed.
fn run_on_worker(job: RunJob) {
    let run = Arc::clone(&job.run);
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            pipeline::mark_failed(&run, format!("Failed to start runtime: {}", e), None);
            return;
        }
    };

    runtime.block_on(async move {
        if let Err(e) = tokio::spawn(pipeline::run(job)).await {
            error!("Run worker panicked: {}", e);
            pipeline::mark_failed(&run, format!("Run aborted: {}", e), None);
        }
    });
}
