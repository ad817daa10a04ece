use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triage_engine::{Monitor, ReportStore, StandardFactory, TaskCatalog, TaskExecutor};

pub mod api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "triage_server=info,triage_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Triage Server...");

    let config_path = TaskCatalog::path_from_env();
    let catalog = TaskCatalog::load(&config_path)
        .with_context(|| format!("Failed to load task catalog from {}", config_path))?;
    catalog.validate().context("Invalid task catalog")?;

    tracing::info!(
        "Loaded {} task(s) from {}",
        catalog.tasks.len(),
        config_path
    );

    let addr = std::env::var("TRIAGE_BIND_ADDR").unwrap_or_else(|_| catalog.server.bind_addr.clone());

    let factory = Arc::new(StandardFactory::new(ReportStore::new()));
    let monitoring = catalog.monitoring.clone();
    let executor = Arc::new(TaskExecutor::new(catalog, factory));

    if monitoring.enabled {
        let monitor = Monitor::new(monitoring, Arc::clone(&executor));
        tokio::spawn(async move { monitor.run().await });
    }

    // Build router with all API endpoints
    let app = api::create_router(executor);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}
