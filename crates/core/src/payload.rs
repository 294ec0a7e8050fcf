//! Job trigger messages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::orchestrator::{RunMode, RunOptions};
use crate::registry::StepName;

/// Message that asks a worker to run a job.
///
/// ```json
/// {"jobId": "…", "runMode": "resume", "skipSteps": ["publish_upload"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTrigger {
    pub job_id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_mode: Option<RunMode>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_steps: Vec<String>,
}

impl JobTrigger {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            run_mode: None,
            skip_steps: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = Some(mode);
        self
    }

    pub fn with_skip(mut self, step: StepName) -> Self {
        self.skip_steps.push(step.as_str().to_string());
        self
    }

    /// Decode and validate a raw message body.
    pub fn parse(bytes: &[u8]) -> WorkflowResult<(Self, RunOptions)> {
        let trigger: JobTrigger = serde_json::from_slice(bytes)
            .map_err(|e| WorkflowError::Validation(format!("invalid job trigger: {}", e)))?;
        let options = trigger.run_options()?;
        Ok((trigger, options))
    }

    /// Resolve run options. Every skip name must be a registry step;
    /// duplicates collapse.
    pub fn run_options(&self) -> WorkflowResult<RunOptions> {
        let skip_steps = self
            .skip_steps
            .iter()
            .map(|name| name.parse::<StepName>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(RunOptions {
            mode: self.run_mode.unwrap_or_default(),
            skip_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    const JOB: &str = "6f1c2a4e-9d3b-4c57-8e2a-0b5d7f9e1a23";

    #[test]
    fn test_minimal_trigger_defaults_to_resume() {
        let body = format!(r#"{{"jobId":"{}"}}"#, JOB);
        let (trigger, options) = JobTrigger::parse(body.as_bytes()).unwrap();
        assert_eq!(trigger.job_id.to_string(), JOB);
        assert_eq!(options.mode, RunMode::Resume);
        assert!(options.skip_steps.is_empty());
    }

    #[test]
    fn test_skip_steps_deduplicated() {
        let body = format!(
            r#"{{"jobId":"{}","runMode":"full","skipSteps":["final_encoding","tts_generation","final_encoding"]}}"#,
            JOB
        );
        let (_, options) = JobTrigger::parse(body.as_bytes()).unwrap();
        assert_eq!(options.mode, RunMode::Full);
        assert_eq!(
            options.skip_steps.into_iter().collect::<Vec<_>>(),
            vec![StepName::SpeechSynthesis, StepName::FinalEncoding]
        );
    }

    #[test]
    fn test_unknown_skip_step_rejected() {
        let body = format!(r#"{{"jobId":"{}","skipSteps":["render_thumbnail"]}}"#, JOB);
        let err = JobTrigger::parse(body.as_bytes()).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStep(_)));
    }

    #[test]
    fn test_bad_job_id_and_mode_rejected() {
        let err = assert_err!(JobTrigger::parse(br#"{"jobId":"not-a-uuid"}"#));
        assert!(matches!(err, WorkflowError::Validation(_)));

        let body = format!(r#"{{"jobId":"{}","runMode":"partial"}}"#, JOB);
        assert_err!(JobTrigger::parse(body.as_bytes()));
    }

    #[test]
    fn test_builder_serialization() {
        let trigger = JobTrigger::new(Uuid::nil())
            .with_mode(RunMode::Full)
            .with_skip(StepName::PublishUpload);
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["runMode"], "full");
        assert_eq!(json["skipSteps"][0], "publish_upload");
    }
}
