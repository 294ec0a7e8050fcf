//! Job and step state records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::StepName;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// No further transitions are made from a final status.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

/// Lifecycle of one step within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for StepStatus {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "SKIPPED" => Self::Skipped,
            "FAILED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Why a step was recorded as SKIPPED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No implementation was supplied for the step.
    NotImplemented,
    /// The caller asked for the step to be skipped.
    ManualSkip,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImplemented => "not_implemented",
            Self::ManualSkip => "manual_skip",
        }
    }

    /// Output payload stored on a SKIPPED row.
    pub fn output(&self) -> serde_json::Value {
        serde_json::json!({ "skipped": true, "reason": self.as_str() })
    }

    /// Read the skip reason back out of a stored output payload.
    pub fn from_output(output: Option<&serde_json::Value>) -> Option<Self> {
        let output = output?;
        if output.get("skipped").and_then(|v| v.as_bool()) != Some(true) {
            return None;
        }
        match output.get("reason").and_then(|v| v.as_str()) {
            Some("not_implemented") => Some(Self::NotImplemented),
            Some("manual_skip") => Some(Self::ManualSkip),
            _ => None,
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one (job, step) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub job_id: Uuid,
    pub step_name: StepName,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_json: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StepState {
    /// Fresh PENDING row.
    pub fn pending(job_id: Uuid, step_name: StepName) -> Self {
        Self {
            job_id,
            step_name,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            output_json: None,
            error: None,
        }
    }

    /// Skip reason, when the row is SKIPPED.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if self.status != StepStatus::Skipped {
            return None;
        }
        SkipReason::from_output(self.output_json.as_ref())
    }
}

/// Partial update applied to a step row.
///
/// `None` leaves a column untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepUpdate {
    pub status: Option<StepStatus>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub output_json: Option<Option<serde_json::Value>>,
    pub error: Option<Option<String>>,
}

impl StepUpdate {
    pub fn status(status: StepStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn started_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn output(mut self, output: Option<serde_json::Value>) -> Self {
        self.output_json = Some(output);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    /// Apply the update on top of an existing row.
    pub fn apply_to(&self, state: &mut StepState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(at) = self.started_at {
            state.started_at = at;
        }
        if let Some(at) = self.completed_at {
            state.completed_at = at;
        }
        if let Some(ref output) = self.output_json {
            state.output_json = output.clone();
        }
        if let Some(ref error) = self.error {
            state.error = error.clone();
        }
    }
}

/// Job record as seen by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub project_id: Option<String>,
    pub status: JobStatus,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_and_parse() {
        assert_eq!(StepStatus::Skipped.to_string(), "SKIPPED");
        assert_eq!(StepStatus::from("completed"), StepStatus::Completed);
        assert_eq!(StepStatus::from("garbage"), StepStatus::Pending);
        assert_eq!(JobStatus::from("canceled"), JobStatus::Cancelled);
        assert!(JobStatus::Failed.is_final());
        assert!(!JobStatus::Running.is_final());
    }

    #[test]
    fn test_skip_reason_round_trip() {
        let output = SkipReason::ManualSkip.output();
        assert_eq!(output["skipped"], true);
        assert_eq!(output["reason"], "manual_skip");
        assert_eq!(
            SkipReason::from_output(Some(&output)),
            Some(SkipReason::ManualSkip)
        );
        assert_eq!(
            SkipReason::from_output(Some(&serde_json::json!({"ok": true}))),
            None
        );
    }

    #[test]
    fn test_skip_reason_requires_skipped_status() {
        let mut state = StepState::pending(Uuid::new_v4(), StepName::ThemeSelection);
        state.output_json = Some(SkipReason::NotImplemented.output());
        assert_eq!(state.skip_reason(), None);
        state.status = StepStatus::Skipped;
        assert_eq!(state.skip_reason(), Some(SkipReason::NotImplemented));
    }

    #[test]
    fn test_update_clears_error() {
        let mut state = StepState::pending(Uuid::new_v4(), StepName::ThemeSelection);
        state.status = StepStatus::Failed;
        state.error = Some("boom".to_string());

        StepUpdate::status(StepStatus::Running)
            .started_at(Some(Utc::now()))
            .error(None)
            .apply_to(&mut state);

        assert_eq!(state.status, StepStatus::Running);
        assert!(state.started_at.is_some());
        assert!(state.error.is_none());
    }
}
