//! Task API Handlers
//!
//! Listing configured tasks and launching runs.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use triage_core::dto::run::{LaunchedRun, RunOverrides};
use triage_core::dto::task::TaskSummary;

use super::AppState;
use crate::api::error::ApiResult;

/// GET /api/tasks
/// List configured tasks
pub async fn list_tasks(State(executor): State<AppState>) -> Json<Vec<TaskSummary>> {
    tracing::debug!("Listing tasks");

    Json(
        executor
            .catalog()
            .tasks
            .iter()
            .map(TaskSummary::from)
            .collect(),
    )
}

/// POST /api/tasks/{name}/run
/// Launch a run; query parameters override the task's source and analyzer
pub async fn run_task(
    State(executor): State<AppState>,
    Path(name): Path<String>,
    Query(overrides): Query<RunOverrides>,
) -> ApiResult<(StatusCode, Json<LaunchedRun>)> {
    tracing::info!("Launching task: {}", name);

    let launched = executor.launch(&name, &overrides)?;

    Ok((StatusCode::ACCEPTED, Json(launched)))
}
