//! Worker lifecycle management.

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use ymm_core::StepImplementations;

use crate::config::{DatabaseConfig, WorkerConfig};
use crate::db::{create_pool, health_check, PgStore};
use crate::nats::NatsSubscriber;
use crate::runner::JobRunner;

/// Worker that runs jobs triggered over NATS.
pub struct Worker {
    /// Worker configuration.
    config: WorkerConfig,

    /// NATS subscriber for job triggers.
    subscriber: NatsSubscriber,

    /// Job runner shared by spawned tasks.
    runner: Arc<JobRunner>,

    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
}

impl Worker {
    /// Connect to PostgreSQL and NATS and build the job runner.
    pub async fn new(
        config: WorkerConfig,
        database: DatabaseConfig,
        implementations: StepImplementations,
    ) -> Result<Self> {
        let pool = create_pool(&database).await?;
        if !health_check(&pool).await {
            anyhow::bail!("Database {} is not answering", database.display_target());
        }
        let store = Arc::new(PgStore::new(pool));

        let subscriber = NatsSubscriber::connect(
            &config.nats_url,
            &config.nats_stream,
            &config.nats_subject,
            &config.nats_consumer,
            config.job_ack_wait,
            config.job_max_deliver,
        )
        .await?;

        tracing::info!(
            implemented = ?implementations.list(),
            "Step implementations loaded"
        );

        let runner = Arc::new(JobRunner::new(
            store.clone(),
            store,
            config.output_root.clone(),
            implementations,
            config.reliability(),
        ));

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));

        Ok(Self {
            config,
            subscriber,
            runner,
            semaphore,
        })
    }

    /// Run the worker until the message loop fails.
    pub async fn run(&self) -> Result<()> {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        tracing::info!(
            worker_id = %self.config.worker_id,
            hostname = %hostname,
            consumer = %self.subscriber.name(),
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Worker ready"
        );

        self.process_jobs().await
    }

    /// Process job triggers from NATS.
    async fn process_jobs(&self) -> Result<()> {
        loop {
            // Wait for available slot
            let permit = self.semaphore.clone().acquire_owned().await?;

            let Some(msg) = self.subscriber.receive().await? else {
                drop(permit);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                continue;
            };

            let (trigger, options) = match NatsSubscriber::decode(&msg) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding invalid job trigger");
                    NatsSubscriber::ack(&msg).await?;
                    drop(permit);
                    continue;
                }
            };

            tracing::debug!(
                job_id = %trigger.job_id,
                mode = %options.mode,
                skip_steps = ?options.skip_steps,
                "Received job trigger"
            );

            let runner = self.runner.clone();
            let progress_interval = self.config.progress_interval();
            tokio::spawn(async move {
                // Keep permit until done
                let _permit = permit;

                let msg = Arc::new(msg);
                let job_id = trigger.job_id;
                let progress_msg = msg.clone();
                let heartbeat = spawn_heartbeat(progress_interval, move || {
                    let msg = progress_msg.clone();
                    async move {
                        if let Err(e) = NatsSubscriber::progress(&msg).await {
                            tracing::warn!(job_id = %job_id, error = %e, "Progress ack failed");
                        } else {
                            tracing::trace!(job_id = %job_id, "Progress ack sent");
                        }
                    }
                });

                let outcome = runner.run_job(trigger.job_id, &options).await;
                heartbeat.abort();
                let ack = match outcome {
                    Ok(_) => NatsSubscriber::ack(&msg).await,
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(job_id = %trigger.job_id, error = %e, "Job interrupted, requesting redelivery");
                        NatsSubscriber::nack(&msg).await
                    }
                    Err(e) => {
                        tracing::error!(job_id = %trigger.job_id, error = %e, "Job did not complete");
                        NatsSubscriber::ack(&msg).await
                    }
                };

                if let Err(e) = ack {
                    tracing::error!(job_id = %trigger.job_id, error = %e, "Failed to settle message");
                }
            });
        }
    }
}

/// Call `beat` every `interval` until the returned handle is aborted.
fn spawn_heartbeat<F, Fut>(interval: Duration, mut beat: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip first immediate tick

        loop {
            ticker.tick().await;
            beat().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_beats_until_aborted() {
        let beats = Arc::new(AtomicUsize::new(0));
        let counter = beats.clone();
        let heartbeat = spawn_heartbeat(Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(beats.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(beats.load(Ordering::SeqCst), 3);

        heartbeat.abort();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(beats.load(Ordering::SeqCst), 3);
    }
}
