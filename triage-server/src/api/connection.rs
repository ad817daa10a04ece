//! Connection Test Handlers
//!
//! Checking that a data source is reachable before running a task on it.

use axum::{
    Json,
    extract::{Path, State},
};
use triage_core::domain::task::PluginSpec;
use triage_core::dto::connection::ConnectionTest;

use super::AppState;
use crate::api::error::ApiResult;

/// POST /api/test-connection
/// Test an ad-hoc source definition
pub async fn test_connection(
    State(executor): State<AppState>,
    Json(spec): Json<PluginSpec>,
) -> Json<ConnectionTest> {
    tracing::info!("Testing connection for source: {}", spec.name);

    Json(executor.test_source(&spec).await)
}

/// POST /api/tasks/{name}/test-connection
/// Test the source of a configured task
pub async fn test_task_connection(
    State(executor): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ConnectionTest>> {
    tracing::info!("Testing connection for task: {}", name);

    let result = executor.test_task_connection(&name).await?;

    Ok(Json(result))
}
