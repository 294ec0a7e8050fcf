//! Error types for the worker.

use thiserror::Error;
use ymm_core::WorkflowError;

/// Worker-level errors.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Row that does not map onto a known value
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Orchestration error
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl From<WorkerError> for WorkflowError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Workflow(e) => e,
            other => WorkflowError::store(other),
        }
    }
}

/// Result type alias for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;
