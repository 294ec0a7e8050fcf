//! Job execution: step rows, job status and the orchestrator run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use ymm_core::{
    with_reliability, JobRepository, JobRun, JobStatus, ReliabilityOptions, RunOptions,
    RunSummary, StepImplementations, StepStateStore, WorkflowError, WorkflowOrchestrator,
    WORKFLOW_STEPS,
};

/// Why a job did not complete.
#[derive(Error, Debug)]
pub enum RunError {
    /// The job cannot run as requested; retrying will not help.
    #[error("Rejected job {job_id}: {reason}")]
    Rejected { job_id: Uuid, reason: String },

    /// A step failed and the job is now FAILED.
    #[error("Job {job_id} failed: {source}")]
    Failed {
        job_id: Uuid,
        #[source]
        source: WorkflowError,
    },

    /// Storage was unavailable; the trigger should be redelivered.
    #[error("Job {job_id} interrupted: {source}")]
    Infrastructure {
        job_id: Uuid,
        #[source]
        source: WorkflowError,
    },
}

impl RunError {
    /// Whether redelivering the trigger may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RunError::Infrastructure { .. })
    }
}

/// One async mutex per job id. Entries are dropped once unused.
#[derive(Default)]
pub struct JobLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, job_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(job_id).or_default().clone()
    }

    fn release(&self, job_id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(&job_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&job_id);
            }
        }
    }

    /// Number of jobs with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs jobs against a state store and a job repository.
pub struct JobRunner {
    steps: Arc<dyn StepStateStore>,
    jobs: Arc<dyn JobRepository>,
    orchestrator: WorkflowOrchestrator,
    implementations: StepImplementations,
    locks: JobLocks,
}

impl JobRunner {
    /// Create a runner. Implementations are wrapped with the reliability
    /// layer once, here.
    pub fn new(
        steps: Arc<dyn StepStateStore>,
        jobs: Arc<dyn JobRepository>,
        output_root: impl Into<PathBuf>,
        implementations: StepImplementations,
        reliability: ReliabilityOptions,
    ) -> Self {
        Self {
            orchestrator: WorkflowOrchestrator::new(steps.clone(), output_root),
            steps,
            jobs,
            implementations: with_reliability(implementations, reliability),
            locks: JobLocks::new(),
        }
    }

    /// Run one job. Runs for the same job are serialised.
    pub async fn run_job(&self, job_id: Uuid, options: &RunOptions) -> Result<RunSummary, RunError> {
        let lock = self.locks.handle(job_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_locked(job_id, options).await
        };
        drop(lock);
        self.locks.release(job_id);
        result
    }

    async fn run_locked(&self, job_id: Uuid, options: &RunOptions) -> Result<RunSummary, RunError> {
        let infra = |source: WorkflowError| RunError::Infrastructure { job_id, source };

        let job = self
            .jobs
            .get_job(job_id)
            .await
            .map_err(infra)?
            .ok_or_else(|| RunError::Rejected {
                job_id,
                reason: "job not found".to_string(),
            })?;

        if job.status == JobStatus::Cancelled {
            return Err(RunError::Rejected {
                job_id,
                reason: "job was cancelled".to_string(),
            });
        }

        self.steps
            .ensure_steps(job_id, &WORKFLOW_STEPS)
            .await
            .map_err(infra)?;
        self.jobs
            .set_job_status(job_id, JobStatus::Running, None)
            .await
            .map_err(infra)?;

        tracing::info!(
            job_id = %job_id,
            project_id = job.project_id.as_deref().unwrap_or("-"),
            mode = %options.mode,
            "Job started"
        );

        let mut run = JobRun::new(job_id);
        if let Some(project_id) = job.project_id {
            run = run.with_project_id(project_id);
        }

        match self
            .orchestrator
            .run(&run, &self.implementations, options)
            .await
        {
            Ok(summary) => {
                self.jobs
                    .set_job_status(job_id, JobStatus::Completed, None)
                    .await
                    .map_err(infra)?;
                tracing::info!(job_id = %job_id, executed = summary.executed.len(), "Job completed");
                Ok(summary)
            }
            Err(e) => {
                let message = match &e {
                    WorkflowError::StepFailed { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                self.jobs
                    .set_job_status(job_id, JobStatus::Failed, Some(message))
                    .await
                    .map_err(infra)?;

                if matches!(e, WorkflowError::StepFailed { .. }) {
                    Err(RunError::Failed { job_id, source: e })
                } else {
                    Err(RunError::Infrastructure { job_id, source: e })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};
    use ymm_core::{
        step_fn, MemoryStore, RunMode, StepContext, StepError, StepName, StepStatus,
    };

    fn runner(store: Arc<MemoryStore>, dir: &std::path::Path, impls: StepImplementations) -> JobRunner {
        JobRunner::new(
            store.clone(),
            store,
            dir,
            impls,
            ReliabilityOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_run_job_completes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let job_id = Uuid::new_v4();
        store.insert_job(job_id, Some("p1".to_string())).await;

        let summary = assert_ok!(
            runner(store.clone(), dir.path(), StepImplementations::new())
                .run_job(job_id, &RunOptions::default())
                .await
        );

        assert_eq!(summary.skipped.len(), WORKFLOW_STEPS.len());
        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_run_job_failure_marks_job_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let job_id = Uuid::new_v4();
        store.insert_job(job_id, None).await;
        let impls = StepImplementations::new().with(
            StepName::ScriptGeneration,
            step_fn(|_ctx: StepContext| async { Err(StepError::new("model timeout")) }),
        );

        let err = assert_err!(
            runner(store.clone(), dir.path(), impls)
                .run_job(job_id, &RunOptions::default())
                .await
        );

        assert!(matches!(err, RunError::Failed { .. }));
        assert!(!err.is_retryable());
        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("model timeout"));

        // Pending rows exist for steps the run never reached.
        let rows = store.list_steps(job_id).await.unwrap();
        assert_eq!(rows.len(), WORKFLOW_STEPS.len());
        assert_eq!(rows.last().unwrap().status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_and_cancelled_jobs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let runner = runner(store.clone(), dir.path(), StepImplementations::new());

        let err = runner
            .run_job(Uuid::new_v4(), &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Rejected { .. }));

        let job_id = Uuid::new_v4();
        store.insert_job(job_id, None).await;
        store
            .set_job_status(job_id, JobStatus::Cancelled, None)
            .await
            .unwrap();
        let err = runner
            .run_job(job_id, &RunOptions::new(RunMode::Full))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Rejected { .. }));
        assert!(store.list_steps(job_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_job_runs_are_serialised() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let job_id = Uuid::new_v4();
        store.insert_job(job_id, None).await;

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());
        let impls = StepImplementations::new().with(
            StepName::ThemeSelection,
            step_fn(move |_ctx: StepContext| {
                let (a, p) = (a.clone(), p.clone());
                async move {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                    Ok(None)
                }
            }),
        );
        let runner = Arc::new(runner(store, dir.path(), impls));

        let full = RunOptions::new(RunMode::Full);
        let (r1, r2) = tokio::join!(runner.run_job(job_id, &full), runner.run_job(job_id, &full));
        r1.unwrap();
        r2.unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(runner.locks.is_empty());
    }
}
