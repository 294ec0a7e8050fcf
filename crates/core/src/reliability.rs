//! Cache, retry and event logging around step implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::context::StepContext;
use crate::error::StepError;
use crate::registry::StepName;
use crate::step::{StepImplementation, StepImplementations, StepOutput};

/// Retry and cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliabilityOptions {
    /// Extra attempts after the first failure.
    pub retry_count: u32,

    /// Short-circuit when the signature artifact already exists.
    pub cache_enabled: bool,

    /// Delay before the first retry. Zero retries immediately.
    pub initial_delay: Duration,

    /// Upper bound for the doubling delay.
    pub max_delay: Duration,
}

impl Default for ReliabilityOptions {
    fn default() -> Self {
        Self {
            retry_count: 0,
            cache_enabled: true,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Event kinds written to the workflow log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    StepStart,
    StepComplete,
    StepError,
    CacheHit,
}

/// One line of `logs/workflow.log`. `attempt` counts from 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub event: LogEvent,
    pub job_id: Uuid,
    pub step_name: StepName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LogEntry {
    pub fn new(event: LogEvent, ctx: &StepContext) -> Self {
        Self {
            at: Utc::now(),
            event,
            job_id: ctx.job_id,
            step_name: ctx.step_name,
            attempt: None,
            message: None,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Append-only JSON-lines log under a project root.
pub struct WorkflowLog;

impl WorkflowLog {
    /// `<project_root>/logs/workflow.log`.
    pub fn path(project_root: &Path) -> PathBuf {
        project_root.join("logs").join("workflow.log")
    }

    /// Append one entry. Failures are logged and dropped.
    pub async fn append(project_root: &Path, entry: &LogEntry) {
        if let Err(e) = Self::try_append(project_root, entry).await {
            tracing::warn!(
                step = %entry.step_name,
                error = %e,
                "Failed to write workflow log"
            );
        }
    }

    async fn try_append(project_root: &Path, entry: &LogEntry) -> std::io::Result<()> {
        let path = Self::path(project_root);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// A step implementation wrapped with cache, retry and logging.
pub struct ReliableStep {
    inner: Arc<dyn StepImplementation>,
    options: ReliabilityOptions,
}

impl ReliableStep {
    pub fn new(inner: Arc<dyn StepImplementation>, options: ReliabilityOptions) -> Self {
        Self { inner, options }
    }

    async fn cached(&self, ctx: &StepContext) -> bool {
        if !self.options.cache_enabled {
            return false;
        }
        match ctx.signature_path() {
            Some(path) => tokio::fs::metadata(&path).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl StepImplementation for ReliableStep {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        let project_root = ctx.project_root();

        if self.cached(ctx).await {
            tracing::info!(job_id = %ctx.job_id, step = %ctx.step_name, "Step output cached");
            WorkflowLog::append(&project_root, &LogEntry::new(LogEvent::CacheHit, ctx)).await;
            return Ok(Some(serde_json::json!({
                "cached": true,
                "stepName": ctx.step_name,
            })));
        }

        let last_attempt = self.options.retry_count;
        let mut delay = self.options.initial_delay.min(self.options.max_delay);
        let mut last_error = StepError::new("step did not run");

        for attempt in 0..=last_attempt {
            WorkflowLog::append(
                &project_root,
                &LogEntry::new(LogEvent::StepStart, ctx).with_attempt(attempt),
            )
            .await;

            match self.inner.run(ctx).await {
                Ok(output) => {
                    WorkflowLog::append(
                        &project_root,
                        &LogEntry::new(LogEvent::StepComplete, ctx).with_attempt(attempt),
                    )
                    .await;
                    return Ok(output);
                }
                Err(e) => {
                    WorkflowLog::append(
                        &project_root,
                        &LogEntry::new(LogEvent::StepError, ctx)
                            .with_attempt(attempt)
                            .with_message(e.message.clone()),
                    )
                    .await;

                    if attempt < last_attempt {
                        tracing::warn!(
                            job_id = %ctx.job_id,
                            step = %ctx.step_name,
                            attempt,
                            retry_count = last_attempt,
                            error = %e,
                            "Step failed, retrying"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                            delay = next_delay(delay, self.options.max_delay);
                        }
                    }
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Doubled delay, capped at `max`.
fn next_delay(delay: Duration, max: Duration) -> Duration {
    delay.saturating_mul(2).min(max)
}

/// Wrap every implementation in `implementations` with [`ReliableStep`].
pub fn with_reliability(
    implementations: StepImplementations,
    options: ReliabilityOptions,
) -> StepImplementations {
    implementations.map(|_, inner| {
        Arc::new(ReliableStep::new(inner, options.clone())) as Arc<dyn StepImplementation>
    })
}
