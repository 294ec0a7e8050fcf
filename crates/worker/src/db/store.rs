//! PostgreSQL adapter for the core storage ports.

use async_trait::async_trait;
use uuid::Uuid;

use ymm_core::{
    ArtifactSink, Job, JobRepository, JobStatus, ProjectFile, StepName, StepState,
    StepStateStore, StepUpdate, WorkflowError, WorkflowResult,
};

use super::models::WorkflowStepRow;
use super::queries;
use super::DbPool;

/// Step state, jobs and project files backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn to_row(state: &StepState) -> WorkflowStepRow {
    WorkflowStepRow {
        job_id: state.job_id,
        step_name: state.step_name.as_str().to_string(),
        status: state.status.as_str().to_string(),
        started_at: state.started_at,
        completed_at: state.completed_at,
        output_json: state.output_json.clone(),
        error: state.error.clone(),
    }
}

#[async_trait]
impl StepStateStore for PgStore {
    async fn get_step(&self, job_id: Uuid, step: StepName) -> WorkflowResult<Option<StepState>> {
        let row = queries::step::get_step(&self.pool, job_id, step.as_str()).await?;
        Ok(row.map(WorkflowStepRow::into_state).transpose()?)
    }

    async fn list_steps(&self, job_id: Uuid) -> WorkflowResult<Vec<StepState>> {
        let rows = queries::step::list_steps(&self.pool, job_id).await?;
        let mut states = rows
            .into_iter()
            .map(WorkflowStepRow::into_state)
            .collect::<Result<Vec<_>, _>>()?;
        states.sort_by_key(|s| s.step_name.position());
        Ok(states)
    }

    async fn upsert_step(
        &self,
        job_id: Uuid,
        step: StepName,
        update: StepUpdate,
    ) -> WorkflowResult<StepState> {
        let mut tx = self.pool.begin().await.map_err(WorkflowError::store)?;

        let existing = queries::step::get_step_for_update(&mut tx, job_id, step.as_str()).await?;
        let mut state = match existing {
            Some(row) => row.into_state()?,
            None => StepState::pending(job_id, step),
        };
        update.apply_to(&mut state);

        queries::step::upsert_step(&mut tx, &to_row(&state)).await?;
        tx.commit().await.map_err(WorkflowError::store)?;

        Ok(state)
    }

    async fn ensure_steps(&self, job_id: Uuid, steps: &[StepName]) -> WorkflowResult<()> {
        let names: Vec<String> = steps.iter().map(|s| s.as_str().to_string()).collect();
        let created = queries::step::ensure_steps(&self.pool, job_id, &names).await?;
        tracing::debug!(job_id = %job_id, created, "Ensured step rows");
        Ok(())
    }
}

#[async_trait]
impl JobRepository for PgStore {
    async fn get_job(&self, job_id: Uuid) -> WorkflowResult<Option<Job>> {
        let row = queries::job::get_job(&self.pool, job_id).await?;
        Ok(row.map(Job::from))
    }

    async fn set_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> WorkflowResult<()> {
        let updated = match status {
            JobStatus::Running => queries::job::mark_running(&self.pool, job_id).await?,
            s if s.is_final() => {
                queries::job::mark_finished(&self.pool, job_id, s.as_str(), error.as_deref())
                    .await?
            }
            s => {
                queries::job::set_status(&self.pool, job_id, s.as_str(), error.as_deref()).await?
            }
        };

        if updated == 0 {
            return Err(WorkflowError::NotFound(format!("job {}", job_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for PgStore {
    async fn insert_files(&self, files: Vec<ProjectFile>) -> WorkflowResult<usize> {
        let count = queries::project_file::insert_files(&self.pool, &files).await?;
        Ok(count as usize)
    }
}
