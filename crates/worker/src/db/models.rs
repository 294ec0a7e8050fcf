//! Row types for the `ymm` schema.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use ymm_core::{Job, JobStatus, StepName, StepState, StepStatus};

use crate::error::{WorkerError, WorkerResult};

/// Row of `ymm.workflow_step`.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowStepRow {
    pub job_id: Uuid,
    pub step_name: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_json: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl WorkflowStepRow {
    pub fn into_state(self) -> WorkerResult<StepState> {
        let step_name: StepName = self
            .step_name
            .parse()
            .map_err(|_| WorkerError::InvalidRow(format!("unknown step {}", self.step_name)))?;

        Ok(StepState {
            job_id: self.job_id,
            step_name,
            status: StepStatus::from(self.status.as_str()),
            started_at: self.started_at,
            completed_at: self.completed_at,
            output_json: self.output_json,
            error: self.error,
        })
    }
}

/// Row of `ymm.job`.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub project_id: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            project_id: row.project_id,
            status: JobStatus::from(row.status.as_str()),
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}
