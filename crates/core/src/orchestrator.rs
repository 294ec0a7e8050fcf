//! Workflow orchestration engine.
//!
//! Walks the step registry for one job and, for each step:
//! - honours manual skips
//! - decides whether a resumed run may skip it
//! - invokes the implementation and records the outcome
//!
//! Every state write completes before the next step starts. A failing step
//! is recorded as FAILED and aborts the run; later steps are not touched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::context::StepContext;
use crate::error::{WorkflowError, WorkflowResult};
use crate::registry::{StepName, WORKFLOW_STEPS};
use crate::state::{SkipReason, StepState, StepStatus, StepUpdate};
use crate::step::StepImplementations;
use crate::store::StepStateStore;

/// How previously recorded state is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Execute every step regardless of prior state.
    Full,
    /// Skip steps that already completed or were skipped.
    #[default]
    Resume,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// Options for one orchestration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: RunMode,
    pub skip_steps: BTreeSet<StepName>,
}

impl RunOptions {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            skip_steps: BTreeSet::new(),
        }
    }

    pub fn skip(mut self, step: StepName) -> Self {
        self.skip_steps.insert(step);
        self
    }
}

/// What happened to each step during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Steps whose implementation ran and succeeded.
    pub executed: Vec<StepName>,
    /// Steps recorded as SKIPPED during this run.
    pub skipped: Vec<(StepName, SkipReason)>,
    /// Steps left as they were by a resumed run.
    pub unchanged: Vec<StepName>,
}

/// Job identity passed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub job_id: Uuid,
    pub project_id: Option<String>,
}

impl JobRun {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            project_id: None,
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Drives the steps of a job through the state store.
pub struct WorkflowOrchestrator {
    store: Arc<dyn StepStateStore>,
    output_root: PathBuf,
}

enum Decision {
    Execute,
    Unchanged,
}

impl WorkflowOrchestrator {
    /// Create a new orchestrator writing to `store`.
    pub fn new(store: Arc<dyn StepStateStore>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_root: output_root.into(),
        }
    }

    /// Run every registry step for a job.
    ///
    /// Callers must not run two orchestrations for the same job at once.
    pub async fn run(
        &self,
        job: &JobRun,
        implementations: &StepImplementations,
        options: &RunOptions,
    ) -> WorkflowResult<RunSummary> {
        info!(
            job_id = %job.job_id,
            mode = %options.mode,
            skip_steps = options.skip_steps.len(),
            "Starting workflow run"
        );

        let mut summary = RunSummary::default();

        for step in WORKFLOW_STEPS {
            if options.skip_steps.contains(&step) {
                self.record_skip(job.job_id, step, SkipReason::ManualSkip, true)
                    .await?;
                summary.skipped.push((step, SkipReason::ManualSkip));
                continue;
            }

            let existing = self.store.get_step(job.job_id, step).await?;
            let has_implementation = implementations.has(step);

            if let Decision::Unchanged =
                decide(options.mode, existing.as_ref(), has_implementation)
            {
                debug!(job_id = %job.job_id, step = %step, "Step unchanged on resume");
                summary.unchanged.push(step);
                continue;
            }

            self.store
                .upsert_step(
                    job.job_id,
                    step,
                    StepUpdate::status(StepStatus::Running)
                        .started_at(Some(Utc::now()))
                        .completed_at(None)
                        .output(None)
                        .error(None),
                )
                .await?;

            let Some(implementation) = implementations.get(step) else {
                self.record_skip(job.job_id, step, SkipReason::NotImplemented, false)
                    .await?;
                summary.skipped.push((step, SkipReason::NotImplemented));
                continue;
            };

            let mut ctx = StepContext::new(job.job_id, step, self.output_root.clone());
            if let Some(ref project_id) = job.project_id {
                ctx = ctx.with_project_id(project_id.clone());
            }

            match implementation.run(&ctx).await {
                Ok(output) => {
                    let output = output.unwrap_or_else(|| serde_json::json!({ "ok": true }));
                    self.store
                        .upsert_step(
                            job.job_id,
                            step,
                            StepUpdate::status(StepStatus::Completed)
                                .completed_at(Some(Utc::now()))
                                .output(Some(output)),
                        )
                        .await?;
                    info!(job_id = %job.job_id, step = %step, "Step completed");
                    summary.executed.push(step);
                }
                Err(e) => {
                    error!(job_id = %job.job_id, step = %step, error = %e, "Step failed");
                    self.store
                        .upsert_step(
                            job.job_id,
                            step,
                            StepUpdate::status(StepStatus::Failed)
                                .completed_at(Some(Utc::now()))
                                .error(Some(e.message.clone())),
                        )
                        .await?;
                    return Err(WorkflowError::StepFailed {
                        step,
                        message: e.message,
                    });
                }
            }
        }

        info!(
            job_id = %job.job_id,
            executed = summary.executed.len(),
            skipped = summary.skipped.len(),
            unchanged = summary.unchanged.len(),
            "Workflow run finished"
        );

        Ok(summary)
    }

    async fn record_skip(
        &self,
        job_id: Uuid,
        step: StepName,
        reason: SkipReason,
        stamp_start: bool,
    ) -> WorkflowResult<StepState> {
        let now = Utc::now();
        let mut update = StepUpdate::status(StepStatus::Skipped)
            .completed_at(Some(now))
            .output(Some(reason.output()))
            .error(None);
        if stamp_start {
            update = update.started_at(Some(now));
        }

        info!(job_id = %job_id, step = %step, reason = %reason, "Step skipped");
        self.store.upsert_step(job_id, step, update).await
    }
}

/// Resume-mode rules. Only `not_implemented` skips are revisited, and only
/// once an implementation exists; manual skips stay put until a full run.
fn decide(mode: RunMode, existing: Option<&StepState>, has_implementation: bool) -> Decision {
    if mode == RunMode::Full {
        return Decision::Execute;
    }
    let Some(existing) = existing else {
        return Decision::Execute;
    };

    match existing.status {
        StepStatus::Completed => Decision::Unchanged,
        StepStatus::Skipped => {
            let reprocessable = existing.skip_reason() == Some(SkipReason::NotImplemented)
                && has_implementation;
            if reprocessable {
                Decision::Execute
            } else {
                Decision::Unchanged
            }
        }
        StepStatus::Pending | StepStatus::Running | StepStatus::Failed => Decision::Execute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use crate::step::step_fn;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator(store: Arc<MemoryStore>) -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(store, "/tmp/ymm-test")
    }

    fn counting(counter: Arc<AtomicUsize>) -> impl crate::step::StepImplementation {
        step_fn(move |_ctx: StepContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
    }

    async fn status(store: &MemoryStore, job_id: Uuid, step: StepName) -> StepState {
        store.get_step(job_id, step).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_full_run_without_implementations_skips_everything() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());

        let summary = orchestrator(store.clone())
            .run(&job, &StepImplementations::new(), &RunOptions::new(RunMode::Full))
            .await
            .unwrap();

        assert_eq!(summary.skipped.len(), WORKFLOW_STEPS.len());
        for step in WORKFLOW_STEPS {
            let row = status(&store, job.job_id, step).await;
            assert_eq!(row.status, StepStatus::Skipped);
            assert_eq!(row.skip_reason(), Some(SkipReason::NotImplemented));
            assert!(row.completed_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_successful_step_defaults_output() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        let counter = Arc::new(AtomicUsize::new(0));
        let impls = StepImplementations::new()
            .with(StepName::ThemeSelection, counting(counter.clone()))
            .with(
                StepName::ScriptGeneration,
                step_fn(|_ctx: StepContext| async { Ok(Some(serde_json::json!({"lines": 3}))) }),
            );

        let summary = orchestrator(store.clone())
            .run(&job, &impls, &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(
            summary.executed,
            vec![StepName::ThemeSelection, StepName::ScriptGeneration]
        );
        let theme = status(&store, job.job_id, StepName::ThemeSelection).await;
        assert_eq!(theme.status, StepStatus::Completed);
        assert_eq!(theme.output_json, Some(serde_json::json!({"ok": true})));
        assert!(theme.started_at.is_some());
        let script = status(&store, job.job_id, StepName::ScriptGeneration).await;
        assert_eq!(script.output_json, Some(serde_json::json!({"lines": 3})));
    }

    #[tokio::test]
    async fn test_manual_skip_overrides_completed() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        store
            .upsert_step(
                job.job_id,
                StepName::FinalEncoding,
                StepUpdate::status(StepStatus::Completed).error(Some("stale".to_string())),
            )
            .await
            .unwrap();

        let options = RunOptions::new(RunMode::Resume).skip(StepName::FinalEncoding);
        orchestrator(store.clone())
            .run(&job, &StepImplementations::new(), &options)
            .await
            .unwrap();

        let row = status(&store, job.job_id, StepName::FinalEncoding).await;
        assert_eq!(row.status, StepStatus::Skipped);
        assert_eq!(row.skip_reason(), Some(SkipReason::ManualSkip));
        assert!(row.started_at.is_some());
        assert!(row.completed_at.is_some());
        assert!(row.error.is_none());
    }

    #[tokio::test]
    async fn test_manual_skip_does_not_invoke_implementation() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        let counter = Arc::new(AtomicUsize::new(0));
        let impls = StepImplementations::new()
            .with(StepName::ThemeSelection, counting(counter.clone()));

        let options = RunOptions::new(RunMode::Full).skip(StepName::ThemeSelection);
        orchestrator(store)
            .run(&job, &impls, &options)
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resume_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut impls = StepImplementations::new();
        for step in WORKFLOW_STEPS {
            impls.register(step, counting(counter.clone()));
        }
        let orch = orchestrator(store.clone());

        orch.run(&job, &impls, &RunOptions::default()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), WORKFLOW_STEPS.len());
        let before = store.list_steps(job.job_id).await.unwrap();

        let summary = orch.run(&job, &impls, &RunOptions::default()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), WORKFLOW_STEPS.len());
        assert_eq!(summary.unchanged.len(), WORKFLOW_STEPS.len());
        assert_eq!(store.list_steps(job.job_id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_full_mode_reruns_completed_steps() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        let counter = Arc::new(AtomicUsize::new(0));
        let impls = StepImplementations::new()
            .with(StepName::ThemeSelection, counting(counter.clone()));
        let orch = orchestrator(store);

        orch.run(&job, &impls, &RunOptions::default()).await.unwrap();
        orch.run(&job, &impls, &RunOptions::new(RunMode::Full)).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_aborts_and_resume_retries() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        let failing = StepImplementations::new().with(
            StepName::SpeechSynthesis,
            step_fn(|_ctx: StepContext| async { Err(StepError::new("engine offline")) }),
        );
        let orch = orchestrator(store.clone());

        let err = orch
            .run(&job, &failing, &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::StepFailed { step: StepName::SpeechSynthesis, ref message } if message == "engine offline"
        ));

        let row = status(&store, job.job_id, StepName::SpeechSynthesis).await;
        assert_eq!(row.status, StepStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("engine offline"));
        assert!(store
            .get_step(job.job_id, StepName::CharacterSynthesis)
            .await
            .unwrap()
            .is_none());

        let counter = Arc::new(AtomicUsize::new(0));
        let fixed = StepImplementations::new()
            .with(StepName::SpeechSynthesis, counting(counter.clone()));
        orch.run(&job, &fixed, &RunOptions::default()).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let row = status(&store, job.job_id, StepName::SpeechSynthesis).await;
        assert_eq!(row.status, StepStatus::Completed);
        assert!(row.error.is_none());
    }

    #[tokio::test]
    async fn test_resume_reruns_interrupted_step() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        let crashed_at = Utc::now() - chrono::Duration::minutes(5);
        store
            .upsert_step(
                job.job_id,
                StepName::ThemeSelection,
                StepUpdate::status(StepStatus::Running).started_at(Some(crashed_at)),
            )
            .await
            .unwrap();
        store
            .ensure_steps(job.job_id, &[StepName::ScriptGeneration])
            .await
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let impls = StepImplementations::new()
            .with(StepName::ThemeSelection, counting(counter.clone()))
            .with(StepName::ScriptGeneration, counting(counter.clone()));
        let summary = orchestrator(store.clone())
            .run(&job, &impls, &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(
            summary.executed,
            vec![StepName::ThemeSelection, StepName::ScriptGeneration]
        );
        let row = status(&store, job.job_id, StepName::ThemeSelection).await;
        assert_eq!(row.status, StepStatus::Completed);
        assert!(row.started_at.unwrap() > crashed_at);
        assert!(row.completed_at.is_some());
        let row = status(&store, job.job_id, StepName::ScriptGeneration).await;
        assert_eq!(row.status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_rerun_failure_drops_previous_output() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        let orch = orchestrator(store.clone());
        let impls = StepImplementations::new().with(
            StepName::ThemeSelection,
            step_fn(|_ctx: StepContext| async { Ok(Some(serde_json::json!({"theme": "rust"}))) }),
        );
        orch.run(&job, &impls, &RunOptions::default()).await.unwrap();
        let row = status(&store, job.job_id, StepName::ThemeSelection).await;
        assert_eq!(row.output_json, Some(serde_json::json!({"theme": "rust"})));

        let failing = StepImplementations::new().with(
            StepName::ThemeSelection,
            step_fn(|_ctx: StepContext| async { Err(StepError::new("quota exceeded")) }),
        );
        orch.run(&job, &failing, &RunOptions::new(RunMode::Full))
            .await
            .unwrap_err();

        let row = status(&store, job.job_id, StepName::ThemeSelection).await;
        assert_eq!(row.status, StepStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("quota exceeded"));
        assert!(row.output_json.is_none());
    }

    #[tokio::test]
    async fn test_resume_picks_up_newly_implemented_step() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        let orch = orchestrator(store.clone());

        orch.run(&job, &StepImplementations::new(), &RunOptions::default())
            .await
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let impls = StepImplementations::new()
            .with(StepName::VideoComposition, counting(counter.clone()));
        let summary = orch.run(&job, &impls, &RunOptions::default()).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(summary.executed, vec![StepName::VideoComposition]);
        assert_eq!(summary.unchanged.len(), WORKFLOW_STEPS.len() - 1);
    }

    #[tokio::test]
    async fn test_resume_keeps_manual_skip() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4());
        let counter = Arc::new(AtomicUsize::new(0));
        let impls = StepImplementations::new()
            .with(StepName::PublishUpload, counting(counter.clone()));
        let orch = orchestrator(store.clone());

        orch.run(&job, &impls, &RunOptions::default().skip(StepName::PublishUpload))
            .await
            .unwrap();
        orch.run(&job, &impls, &RunOptions::default()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        orch.run(&job, &impls, &RunOptions::new(RunMode::Full)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_context_carries_project() {
        let store = Arc::new(MemoryStore::new());
        let job = JobRun::new(Uuid::new_v4()).with_project_id("channel-7");
        let impls = StepImplementations::new().with(
            StepName::ThemeSelection,
            step_fn(|ctx: StepContext| async move {
                Ok(Some(serde_json::json!({
                    "root": ctx.project_root().to_string_lossy(),
                })))
            }),
        );

        orchestrator(store.clone())
            .run(&job, &impls, &RunOptions::default())
            .await
            .unwrap();

        let row = status(&store, job.job_id, StepName::ThemeSelection).await;
        assert_eq!(
            row.output_json,
            Some(serde_json::json!({"root": "/tmp/ymm-test/projects/channel-7"}))
        );
    }
}
