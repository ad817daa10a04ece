//! Report API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use triage_core::domain::report::{Report, ReportSummary};
use triage_core::dto::report::ReportQuery;

use super::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /api/reports
/// List reports, newest first
pub async fn list_reports(
    State(executor): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Json<Vec<ReportSummary>> {
    tracing::debug!("Listing reports: {:?}", query);

    Json(executor.list_reports(&query))
}

/// GET /api/reports/{id}
/// Report by composite key or run id
pub async fn get_report(
    State(executor): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Report>> {
    tracing::debug!("Getting report: {}", id);

    executor
        .get_report(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Report {} not found", id)))
}
