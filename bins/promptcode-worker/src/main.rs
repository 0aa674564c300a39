mod config;
mod differ;
mod evaluator;
mod executor;
mod generation;
mod normalizer;
mod scorer;
mod store;

use config::WorkerConfig;
use generation::{GenerationService, OpenAiGeneration};
use promptcode_common::redis;
use std::time::Duration;
use store::RedisStore;
use tokio::signal;
use tracing::{error, info, instrument, warn};

/// How often an in-flight submission checks for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("PromptCode Worker booting...");

    let config = WorkerConfig::from_env().map_err(|e| {
        error!("Failed to load worker configuration: {:#}", e);
        e
    })?;

    info!(
        model = %config.generation.model,
        api_base = %config.generation.api_base,
        timeout_secs = config.generation.timeout_secs,
        max_retries = config.generation.max_retries,
        numeric_equality = ?config.evaluation.numeric_equality,
        pass_policy = ?config.evaluation.pass_policy,
        "Worker configured"
    );

    let generator = OpenAiGeneration::new(config.generation.clone())?;

    // Connect to Redis
    let client = ::redis::Client::open(config.redis_url.as_str())?;
    let mut redis_conn = ::redis::aio::ConnectionManager::new(client).await?;
    let store = RedisStore::new(redis_conn.clone());

    info!("Connected to Redis: {}", config.redis_url);

    // Setup graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        warn!("Received shutdown signal, stopping after current submission...");
    };

    tokio::select! {
        _ = worker_loop(&mut redis_conn, &generator, &store, &config) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip_all)]
async fn worker_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    generator: &dyn GenerationService,
    store: &RedisStore,
    config: &WorkerConfig,
) -> anyhow::Result<()> {
    loop {
        // BLPOP with 5 second timeout for graceful shutdown
        match redis::pop_submission(redis_conn, 5.0).await {
            Ok(Some(job)) => {
                executor::process_submission(job, generator, store, &config.evaluation, CANCEL_POLL_INTERVAL).await
            }
            Ok(None) => {
                // Timeout - check for shutdown
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
