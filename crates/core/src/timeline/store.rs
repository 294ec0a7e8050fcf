//! Timeline persistence keyed by project.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{timeline_from_script, TimelineData};
use crate::context::project_root;
use crate::error::WorkflowResult;
use crate::script::Script;

/// Stored timelines, one per project.
#[async_trait]
pub trait TimelineStore: Send + Sync {
    async fn load(&self, project_id: &str) -> WorkflowResult<Option<TimelineData>>;

    /// Validate and store a timeline, replacing the previous one.
    async fn save(&self, project_id: &str, timeline: &TimelineData) -> WorkflowResult<()>;

    /// Load the project's timeline, deriving and saving one from `script`
    /// the first time.
    async fn read_or_create(&self, project_id: &str, script: &Script) -> WorkflowResult<TimelineData> {
        if let Some(timeline) = self.load(project_id).await? {
            return Ok(timeline);
        }
        let timeline = timeline_from_script(script);
        self.save(project_id, &timeline).await?;
        Ok(timeline)
    }
}

/// `<output_root>/projects/<project>/intermediate/timeline.json`.
pub fn timeline_path(output_root: &Path, project_id: &str) -> PathBuf {
    project_root(output_root, project_id)
        .join("intermediate")
        .join("timeline.json")
}

/// Timelines stored as JSON files under the output root.
#[derive(Debug, Clone)]
pub struct FsTimelineStore {
    output_root: PathBuf,
}

impl FsTimelineStore {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }
}

#[async_trait]
impl TimelineStore for FsTimelineStore {
    async fn load(&self, project_id: &str) -> WorkflowResult<Option<TimelineData>> {
        let path = timeline_path(&self.output_root, project_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let timeline: TimelineData = serde_json::from_slice(&bytes)?;
        timeline.validate()?;
        Ok(Some(timeline))
    }

    async fn save(&self, project_id: &str, timeline: &TimelineData) -> WorkflowResult<()> {
        timeline.validate()?;

        let path = timeline_path(&self.output_root, project_id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Readers never observe a half-written file.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(timeline)?).await?;
        tokio::fs::rename(&staging, &path).await?;

        tracing::debug!(project_id = %project_id, path = %path.display(), "Timeline saved");
        Ok(())
    }
}
