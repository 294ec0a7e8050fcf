//! Artifact metadata and project file registration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::WorkflowResult;
use crate::registry::StepName;

/// Kind of file a step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Audio,
    Subtitle,
    Image,
    Video,
    Script,
    Metadata,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::Image => "image",
            Self::Video => "video",
            Self::Script => "script",
            Self::Metadata => "metadata",
        }
    }
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a file sits in the project lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Input,
    #[default]
    Output,
    Intermediate,
    Final,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Intermediate => "intermediate",
            Self::Final => "final",
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Ass,
    Srt,
    Vtt,
    Json,
}

/// Kind-specific metadata, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactDetails {
    #[serde(rename_all = "camelCase")]
    Audio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_rate_hz: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channels: Option<u16>,
    },
    #[serde(rename_all = "camelCase")]
    Subtitle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<SubtitleFormat>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_count: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Video {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_rate: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Script {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_count: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Metadata {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
}

impl ArtifactDetails {
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Self::Audio { .. } => ArtifactType::Audio,
            Self::Subtitle { .. } => ArtifactType::Subtitle,
            Self::Image { .. } => ArtifactType::Image,
            Self::Video { .. } => ArtifactType::Video,
            Self::Script { .. } => ArtifactType::Script,
            Self::Metadata { .. } => ArtifactType::Metadata,
        }
    }
}

/// Description of a file produced by a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    /// Path relative to the output root, with forward slashes.
    pub relative_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_category: Option<FileCategory>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,

    #[serde(flatten)]
    pub details: ArtifactDetails,
}

impl ArtifactMetadata {
    pub fn new(relative_path: impl Into<String>, details: ArtifactDetails) -> Self {
        Self {
            relative_path: relative_path.into(),
            file_category: None,
            file_size_bytes: None,
            details,
        }
    }

    pub fn with_category(mut self, category: FileCategory) -> Self {
        self.file_category = Some(category);
        self
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.file_size_bytes = Some(bytes);
        self
    }

    pub fn artifact_type(&self) -> ArtifactType {
        self.details.artifact_type()
    }
}

/// Row stored for each registered artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub job_id: Uuid,
    pub step_name: Option<StepName>,
    pub file_type: ArtifactType,
    pub file_category: FileCategory,
    pub relative_path: String,
    pub file_size_bytes: Option<u64>,
}

/// Append-only store of project files.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Insert rows and return how many were written.
    async fn insert_files(&self, files: Vec<ProjectFile>) -> WorkflowResult<usize>;
}

/// Register artifacts produced by a job (and optionally one step).
///
/// Artifacts without their own category get `default_category`. An empty
/// list returns 0 without calling the sink.
pub async fn register_artifacts(
    sink: &dyn ArtifactSink,
    job_id: Uuid,
    step_name: Option<StepName>,
    default_category: FileCategory,
    artifacts: &[ArtifactMetadata],
) -> WorkflowResult<usize> {
    if artifacts.is_empty() {
        return Ok(0);
    }

    let files = artifacts
        .iter()
        .map(|a| ProjectFile {
            job_id,
            step_name,
            file_type: a.artifact_type(),
            file_category: a.file_category.unwrap_or(default_category),
            relative_path: a.relative_path.clone(),
            file_size_bytes: a.file_size_bytes,
        })
        .collect();

    let count = sink.insert_files(files).await?;
    tracing::debug!(job_id = %job_id, count, "Artifacts registered");
    Ok(count)
}

/// In-memory artifact sink.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    files: RwLock<Vec<ProjectFile>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn files(&self) -> Vec<ProjectFile> {
        self.files.read().await.clone()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn insert_files(&self, files: Vec<ProjectFile>) -> WorkflowResult<usize> {
        let count = files.len();
        self.files.write().await.extend(files);
        Ok(count)
    }
}
