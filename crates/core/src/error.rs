//! Error types for the pipeline core.

use thiserror::Error;

use crate::registry::StepName;
use crate::timeline::TimelineError;

/// Errors raised while orchestrating a job.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Input rejected before any state was touched.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A step name outside the registry.
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// A step implementation failed after all attempts.
    #[error("Step {step} failed: {message}")]
    StepFailed { step: StepName, message: String },

    /// State store or artifact store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Timeline failed validation.
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Create a store error from anything displayable.
    pub fn store(err: impl std::fmt::Display) -> Self {
        WorkflowError::Store(err.to_string())
    }
}

/// Error returned by a step implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StepError {
    pub message: String,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        StepError::new(err.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        StepError::new(err.to_string())
    }
}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        StepError::new(message)
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        StepError::new(message)
    }
}

/// Result type for core operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_display() {
        let err = WorkflowError::StepFailed {
            step: StepName::SpeechSynthesis,
            message: "voicevox offline".to_string(),
        };
        assert_eq!(err.to_string(), "Step speech_synthesis failed: voicevox offline");
    }

    #[test]
    fn test_step_error_from_str() {
        let err: StepError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }
}
