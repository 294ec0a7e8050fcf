//! Execution context handed to step implementations.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::registry::StepName;

/// Context passed to a step implementation for one invocation.
///
/// Contains:
/// - the job and step being executed
/// - the output root under which project files live
/// - the owning project, when the job has one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepContext {
    /// Job being executed.
    pub job_id: Uuid,

    /// Step being executed.
    pub step_name: StepName,

    /// Root directory for generated files.
    pub output_root: PathBuf,

    /// Project owning the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl StepContext {
    /// Create a new step context.
    pub fn new(job_id: Uuid, step_name: StepName, output_root: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            step_name,
            output_root: output_root.into(),
            project_id: None,
        }
    }

    /// Set the owning project.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Key used for the project directory. Falls back to the job id.
    pub fn project_key(&self) -> String {
        self.project_id
            .clone()
            .unwrap_or_else(|| self.job_id.to_string())
    }

    /// `<output_root>/projects/<project>`.
    pub fn project_root(&self) -> PathBuf {
        project_root(&self.output_root, &self.project_key())
    }

    /// `<project_root>/output/<step>/latest`.
    pub fn latest_dir(&self) -> PathBuf {
        self.project_root()
            .join("output")
            .join(self.step_name.as_str())
            .join("latest")
    }

    /// Path of the step's signature artifact, if it has one.
    pub fn signature_path(&self) -> Option<PathBuf> {
        self.step_name
            .signature_artifact()
            .map(|file| self.latest_dir().join(file))
    }
}

/// `<output_root>/projects/<project_id>`.
pub fn project_root(output_root: &Path, project_id: &str) -> PathBuf {
    output_root.join("projects").join(project_id)
}
