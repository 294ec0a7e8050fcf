//! Timeline editing against the on-disk project tree.

use anyhow::{bail, Result};
use std::path::Path;

use ymm_core::script::read_project_script;
use ymm_core::timeline::{to_render_props, RenderProps};
use ymm_core::{FsTimelineStore, TimelineData, TimelineOperation, TimelineStore};

/// Load the project's timeline, creating it from the latest script if needed.
pub async fn load(output_root: &Path, project_id: &str) -> Result<TimelineData> {
    let store = FsTimelineStore::new(output_root);
    if let Some(timeline) = store.load(project_id).await? {
        return Ok(timeline);
    }

    let Some(script) = read_project_script(output_root, project_id).await? else {
        bail!("project {} has no script yet", project_id);
    };
    Ok(store.read_or_create(project_id, &script).await?)
}

/// Apply one edit and store the result.
pub async fn apply(
    output_root: &Path,
    project_id: &str,
    operation: &TimelineOperation,
) -> Result<TimelineData> {
    let current = load(output_root, project_id).await?;
    let updated = operation.apply(&current);
    FsTimelineStore::new(output_root)
        .save(project_id, &updated)
        .await?;
    tracing::info!(project_id = %project_id, ?operation, "Timeline updated");
    Ok(updated)
}

/// Renderer props for the project's timeline.
pub async fn render_props(output_root: &Path, project_id: &str, fps: u32) -> Result<RenderProps> {
    let timeline = load(output_root, project_id).await?;
    Ok(to_render_props(&timeline, fps))
}
