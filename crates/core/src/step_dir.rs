//! Versioned run directories and the per-step `latest` pointer.
//!
//! Each execution writes into `output/<step>/run-<millis>`. Publishing
//! copies that directory to `output/<step>/latest` via a staging copy and
//! two renames, so `latest` is never observed missing or half-written by a
//! reader that opens it after the swap.

use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::error::WorkflowResult;
use crate::registry::StepName;

/// A fresh run directory for one step execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRunDir {
    pub run_dir: PathBuf,
    pub latest_dir: PathBuf,
}

impl StepRunDir {
    /// Create `<project_root>/output/<step>/run-<millis>`.
    pub async fn create(project_root: &Path, step: StepName) -> WorkflowResult<Self> {
        let step_dir = project_root.join("output").join(step.as_str());
        let run_dir = step_dir.join(format!("run-{}", Utc::now().timestamp_millis()));
        tokio::fs::create_dir_all(&run_dir).await?;

        Ok(Self {
            run_dir,
            latest_dir: step_dir.join("latest"),
        })
    }

    /// Path of `file` inside the run directory.
    pub fn file(&self, file: &str) -> PathBuf {
        self.run_dir.join(file)
    }

    /// Make the run directory's contents the step's `latest`.
    pub async fn publish_latest(&self) -> WorkflowResult<()> {
        let parent = self
            .latest_dir
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let staging = parent.join(format!(".latest-staging-{}", stamp));
        let retired = parent.join(format!(".latest-old-{}", stamp));

        copy_dir(&self.run_dir, &staging).await?;

        let had_latest = tokio::fs::metadata(&self.latest_dir).await.is_ok();
        if had_latest {
            tokio::fs::rename(&self.latest_dir, &retired).await?;
        }
        if let Err(e) = tokio::fs::rename(&staging, &self.latest_dir).await {
            if had_latest {
                let _ = tokio::fs::rename(&retired, &self.latest_dir).await;
            }
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e.into());
        }
        if had_latest {
            if let Err(e) = tokio::fs::remove_dir_all(&retired).await {
                tracing::warn!(path = %retired.display(), error = %e, "Failed to remove old latest");
            }
        }

        tracing::debug!(
            run_dir = %self.run_dir.display(),
            latest = %self.latest_dir.display(),
            "Published latest"
        );
        Ok(())
    }
}

async fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        tokio::fs::create_dir_all(&dst).await?;
        let mut entries = tokio::fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), &target).await?;
            }
        }
    }
    Ok(())
}

/// `path` relative to `root`, with forward slashes.
///
/// Paths outside `root` are returned unchanged.
pub fn relative_to(root: &Path, path: &Path) -> String {
    let Ok(rel) = path.strip_prefix(root) else {
        return path.to_string_lossy().replace('\\', "/");
    };
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
