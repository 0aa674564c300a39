mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use axum::Router;
use promptcode_common::catalog::{JsonCatalog, QuestionCatalog, DEFAULT_QUESTIONS_PATH};
use redis::aio::ConnectionManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub redis: ConnectionManager,
    pub catalog: Arc<dyn QuestionCatalog>,
    /// How long POST /submit-prompt waits for a result
    pub submit_wait: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .init();

    info!("PromptCode API booting...");

    metrics::register_metrics().context("Failed to register metrics")?;

    // Load the question catalog
    let questions_path = std::env::var("QUESTIONS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_QUESTIONS_PATH));
    let catalog = JsonCatalog::load(&questions_path)
        .with_context(|| format!("Failed to load questions from {}", questions_path.display()))?;

    info!(questions = catalog.len(), "Loaded question catalog: {:?}", catalog.list_ids());

    let submit_wait_secs: u64 = match std::env::var("SUBMIT_WAIT_SECS") {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid SUBMIT_WAIT_SECS: '{}'", raw))?,
        Err(_) => 60,
    };

    // Connect to Redis
    let redis_url = std::env::var("REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let client = redis::Client::open(redis_url.as_str())
        .context("Failed to create Redis client")?;

    let redis_conn = ConnectionManager::new(client).await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis: {}", redis_url);

    let state = Arc::new(AppState {
        redis: redis_conn,
        catalog: Arc::new(catalog),
        submit_wait: Duration::from_secs(submit_wait_secs),
    });

    // Build router
    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    // Start server
    let addr = std::env::var("API_ADDR").unwrap_or_else(|_| "0.0.0.0:5001".to_string());
    let listener = TcpListener::bind(&addr).await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app).await
        .context("Server error")?;

    Ok(())
}
