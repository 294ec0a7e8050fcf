//! Narration scripts and their on-disk location.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::project_root;
use crate::error::WorkflowResult;
use crate::registry::StepName;

/// A single spoken line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

impl ScriptLine {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            emotion: None,
        }
    }
}

/// Narration script for one video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub lines: Vec<ScriptLine>,
}

fn script_dir(output_root: &Path, project_id: &str) -> PathBuf {
    project_root(output_root, project_id)
        .join("output")
        .join(StepName::ScriptGeneration.as_str())
}

/// `output/script_generation/latest/script.json` for a project.
pub fn latest_script_path(output_root: &Path, project_id: &str) -> PathBuf {
    script_dir(output_root, project_id)
        .join("latest")
        .join("script.json")
}

/// Load the latest script of a project, if one was generated or saved.
pub async fn read_project_script(
    output_root: &Path,
    project_id: &str,
) -> WorkflowResult<Option<Script>> {
    let path = latest_script_path(output_root, project_id);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Save a hand-edited script as a `manual-<millis>` run and as latest.
pub async fn save_project_script(
    output_root: &Path,
    project_id: &str,
    script: &Script,
) -> WorkflowResult<PathBuf> {
    let body = serde_json::to_vec_pretty(script)?;

    let run_dir = script_dir(output_root, project_id)
        .join(format!("manual-{}", Utc::now().timestamp_millis()));
    tokio::fs::create_dir_all(&run_dir).await?;
    let run_path = run_dir.join("script.json");
    tokio::fs::write(&run_path, &body).await?;

    let latest = latest_script_path(output_root, project_id);
    if let Some(dir) = latest.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(&latest, &body).await?;

    tracing::debug!(project_id = %project_id, path = %run_path.display(), "Script saved");
    Ok(run_path)
}
