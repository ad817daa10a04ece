//! Health Check API Handler

use axum::{Json, extract::State};
use serde_json::{Value, json};

use super::AppState;

/// GET /health
/// Reports liveness and the number of configured tasks
pub async fn health_check(State(executor): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "tasks": executor.task_names().len(),
    }))
}
