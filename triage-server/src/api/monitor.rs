//! Monitoring API Handlers

use axum::{Json, extract::State};
use std::sync::Arc;
use triage_core::dto::monitor::MonitorStatus;
use triage_engine::Monitor;

use super::AppState;

/// GET /api/monitoring/status
/// Scheduled report configuration and next run time
pub async fn get_status(State(executor): State<AppState>) -> Json<MonitorStatus> {
    let config = executor.catalog().monitoring.clone();
    Json(Monitor::new(config, Arc::clone(&executor)).current_status())
}
