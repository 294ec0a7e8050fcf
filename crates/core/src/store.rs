//! Persistence ports for step and job state.
//!
//! The orchestrator only talks to these traits. The worker provides a
//! PostgreSQL adapter; [`MemoryStore`] backs tests and local runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::registry::StepName;
use crate::state::{Job, JobStatus, StepState, StepUpdate};

/// Durable per-(job, step) state.
#[async_trait]
pub trait StepStateStore: Send + Sync {
    /// Load the row for a (job, step) pair, if one exists.
    async fn get_step(&self, job_id: Uuid, step: StepName) -> WorkflowResult<Option<StepState>>;

    /// All rows of a job, in registry order.
    async fn list_steps(&self, job_id: Uuid) -> WorkflowResult<Vec<StepState>>;

    /// Insert or update the row for a (job, step) pair and return it.
    async fn upsert_step(
        &self,
        job_id: Uuid,
        step: StepName,
        update: StepUpdate,
    ) -> WorkflowResult<StepState>;

    /// Create PENDING rows for steps that have none. Existing rows are left
    /// untouched.
    async fn ensure_steps(&self, job_id: Uuid, steps: &[StepName]) -> WorkflowResult<()>;
}

/// Job lifecycle records.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_job(&self, job_id: Uuid) -> WorkflowResult<Option<Job>>;

    /// Move a job to `status`, stamping start/finish times and the error.
    async fn set_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> WorkflowResult<()>;
}

/// In-memory store for step rows and jobs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    steps: RwLock<HashMap<(Uuid, StepName), StepState>>,
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a PENDING job.
    pub async fn insert_job(&self, job_id: Uuid, project_id: Option<String>) {
        self.jobs.write().await.insert(
            job_id,
            Job {
                id: job_id,
                project_id,
                status: JobStatus::Pending,
                error: None,
                started_at: None,
                completed_at: None,
            },
        );
    }
}

#[async_trait]
impl StepStateStore for MemoryStore {
    async fn get_step(&self, job_id: Uuid, step: StepName) -> WorkflowResult<Option<StepState>> {
        Ok(self.steps.read().await.get(&(job_id, step)).cloned())
    }

    async fn list_steps(&self, job_id: Uuid) -> WorkflowResult<Vec<StepState>> {
        let steps = self.steps.read().await;
        let mut rows: Vec<StepState> = steps
            .values()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.step_name.position());
        Ok(rows)
    }

    async fn upsert_step(
        &self,
        job_id: Uuid,
        step: StepName,
        update: StepUpdate,
    ) -> WorkflowResult<StepState> {
        let mut steps = self.steps.write().await;
        let row = steps
            .entry((job_id, step))
            .or_insert_with(|| StepState::pending(job_id, step));
        update.apply_to(row);
        Ok(row.clone())
    }

    async fn ensure_steps(&self, job_id: Uuid, steps: &[StepName]) -> WorkflowResult<()> {
        let mut rows = self.steps.write().await;
        for step in steps {
            rows.entry((job_id, *step))
                .or_insert_with(|| StepState::pending(job_id, *step));
        }
        Ok(())
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn get_job(&self, job_id: Uuid) -> WorkflowResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn set_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> WorkflowResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("job {}", job_id)))?;

        let now = Utc::now();
        match status {
            JobStatus::Running => {
                job.started_at = Some(now);
                job.completed_at = None;
            }
            s if s.is_final() => job.completed_at = Some(now),
            _ => {}
        }
        job.status = status;
        job.error = error;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WORKFLOW_STEPS;
    use crate::state::StepStatus;

    #[tokio::test]
    async fn test_ensure_steps_keeps_existing_rows() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();

        store
            .upsert_step(
                job_id,
                StepName::ScriptGeneration,
                StepUpdate::status(StepStatus::Completed),
            )
            .await
            .unwrap();
        store.ensure_steps(job_id, &WORKFLOW_STEPS).await.unwrap();

        let rows = store.list_steps(job_id).await.unwrap();
        assert_eq!(rows.len(), WORKFLOW_STEPS.len());
        assert_eq!(rows[0].step_name, StepName::ThemeSelection);
        assert_eq!(rows[0].status, StepStatus::Pending);
        assert_eq!(rows[1].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_upsert_is_per_job() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store
            .upsert_step(a, StepName::FinalEncoding, StepUpdate::status(StepStatus::Failed))
            .await
            .unwrap();

        assert!(store.get_step(b, StepName::FinalEncoding).await.unwrap().is_none());
        assert_eq!(store.list_steps(a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_job_status_transitions() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();
        store.insert_job(job_id, Some("demo".to_string())).await;

        store.set_job_status(job_id, JobStatus::Running, None).await.unwrap();
        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        store
            .set_job_status(job_id, JobStatus::Failed, Some("boom".to_string()))
            .await
            .unwrap();
        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_set_status_unknown_job() {
        let store = MemoryStore::new();
        let err = store
            .set_job_status(Uuid::new_v4(), JobStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }
}
