//! YMM pipeline worker binary.
//!
//! Receives job triggers via NATS and runs the production workflow.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ymm_core::StepImplementations;
use ymm_worker::{DatabaseConfig, Worker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ymm_worker=debug,ymm_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting YMM pipeline worker");

    let config = WorkerConfig::from_env()?;
    let database = DatabaseConfig::from_env()?;
    tracing::info!(
        worker_id = %config.worker_id,
        nats_url = %config.nats_url,
        output_root = %config.output_root.display(),
        retry_count = config.retry_count,
        cache_enabled = config.cache_enabled,
        "Worker configuration loaded"
    );

    // Step implementations are provided by deployment-specific builds.
    let worker = Worker::new(config, database, StepImplementations::new()).await?;

    // Handle shutdown signals
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    tokio::select! {
        result = worker.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker error");
                return Err(e);
            }
        }
        _ = shutdown => {
            tracing::info!("Shutting down worker");
        }
    }

    tracing::info!("Worker stopped");
    Ok(())
}
