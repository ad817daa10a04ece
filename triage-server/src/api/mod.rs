//! API Module
//!
//! HTTP API layer over the task executor.
//! Each submodule handles endpoints for a specific resource.

pub mod connection;
pub mod error;
pub mod health;
pub mod monitor;
pub mod report;
pub mod run;
pub mod task;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use triage_engine::TaskExecutor;

/// Shared handler state
pub type AppState = Arc<TaskExecutor>;

/// Create the main API router with all endpoints
pub fn create_router(executor: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Task endpoints
        .route("/api/tasks", get(task::list_tasks))
        .route("/api/tasks/{name}/run", post(task::run_task))
        .route(
            "/api/tasks/{name}/test-connection",
            post(connection::test_task_connection),
        )
        .route("/api/test-connection", post(connection::test_connection))
        // Run endpoints
        .route("/api/runs/{id}", get(run::get_run))
        // Report endpoints
        .route("/api/reports", get(report::list_reports))
        .route("/api/reports/{id}", get(report::get_report))
        // Monitoring endpoints
        .route("/api/monitoring/status", get(monitor::get_status))
        // Add state and middleware
        .with_state(executor)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;
    use triage_engine::{ReportStore, StandardFactory, TaskCatalog};

    const CATALOG: &str = r#"
[[tasks]]
name = "app_logs"

[tasks.source]
name = "file"
params = { path = "/nonexistent/triage/app.log" }

[tasks.analyzer]
name = "chunked_llm"
params = { base_url = "http://127.0.0.1:9", model_name = "test" }

[[tasks.sinks]]
name = "memory"

[[tasks]]
name = "typo_db"

[tasks.source]
name = "mysql_typo"

[tasks.analyzer]
name = "structured_llm"
"#;

    fn app() -> Router {
        let catalog = TaskCatalog::from_toml_str(CATALOG).unwrap();
        let factory = Arc::new(StandardFactory::new(ReportStore::new()));
        create_router(Arc::new(TaskExecutor::new(catalog, factory)))
    }

    async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        send(app, request).await
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, request).await
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tasks"], 2);
    }

    #[tokio::test]
    async fn test_list_tasks() {
        let (status, body) = call(&app(), "GET", "/api/tasks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "app_logs");
        assert_eq!(body[0]["sinks"][0], "memory");
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let (status, body) = call(&app(), "POST", "/api/tasks/missing/run").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_missing_run_and_report_are_404() {
        let app = app();
        let (status, _) = call(&app, "GET", "/api/runs/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", "/api/reports/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    async fn wait_finished(app: &Router, run_id: u64) -> Value {
        for _ in 0..200 {
            let (_, body) = call(app, "GET", &format!("/api/runs/{}", run_id)).await;
            if body["status"] != "running" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {} did not finish", run_id);
    }

    #[tokio::test]
    async fn test_unknown_source_is_accepted_then_fails() {
        let app = app();

        let (status, launched) = call(&app, "POST", "/api/tasks/typo_db/run").await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let run = wait_finished(&app, launched["run_id"].as_u64().unwrap()).await;
        assert_eq!(run["status"], "failed");
        assert!(run["error"].as_str().unwrap().contains("unknown source 'mysql_typo'"));
    }

    #[tokio::test]
    async fn test_connection_endpoints() {
        let app = app();

        let (status, body) = post_json(
            &app,
            "/api/test-connection",
            serde_json::json!({ "name": "file", "params": { "path": "/var/log/app.log" } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["database_type"], "file");
        assert!(body["error"].as_str().unwrap().contains("connection tests"));

        let (status, body) = call(&app, "POST", "/api/tasks/typo_db/test-connection").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failed");
        assert!(body["error"].as_str().unwrap().contains("unknown source"));

        let (status, _) = call(&app, "POST", "/api/tasks/missing/test-connection").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_monitoring_status_defaults() {
        let (status, body) = call(&app(), "GET", "/api/monitoring/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], false);
        assert_eq!(body["report_interval"], 86400);
        assert_eq!(body["report_interval_hours"], 24.0);
        assert_eq!(body["report_hour"], 2);
        assert_eq!(body["hours_ago"], 24);
        assert!(body["next_report_time"].as_str().unwrap().ends_with("02:00:00"));
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let app = app();

        let (status, launched) = call(&app, "POST", "/api/tasks/app_logs/run").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(launched["task_name"], "app_logs");
        assert_eq!(launched["label"], "all");
        let run_id = launched["run_id"].as_u64().unwrap();

        let run = wait_finished(&app, run_id).await;
        assert_eq!(run["status"], "completed");
        assert_eq!(run["stage"], "finished");

        let (status, report) = call(&app, "GET", &format!("/api/reports/{}", run_id)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(report["content"].as_str().unwrap().contains("No errors detected"));

        let (_, reports) = call(&app, "GET", "/api/reports?label=all&limit=5").await;
        assert_eq!(reports.as_array().unwrap().len(), 1);
    }
}
