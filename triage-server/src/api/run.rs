//! Run API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use triage_core::domain::run::{Run, RunId};

use super::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /api/runs/{id}
/// Current state of a run
pub async fn get_run(State(executor): State<AppState>, Path(id): Path<RunId>) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);

    executor
        .get_run(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", id)))
}
