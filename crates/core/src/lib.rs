//! YMM Pipeline Core
//!
//! Orchestration of the video production pipeline.
//!
//! This crate provides:
//! - Ordered step registry and per-step state records
//! - Workflow orchestrator with full/resume runs and manual skips
//! - Reliability wrapper with output caching, retries and a workflow log
//! - Timeline edit engine and render projection
//! - Storage ports with in-memory adapters

pub mod artifacts;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod registry;
pub mod reliability;
pub mod script;
pub mod state;
pub mod step;
pub mod step_dir;
pub mod store;
pub mod timeline;

pub use artifacts::{
    register_artifacts, ArtifactDetails, ArtifactMetadata, ArtifactSink, ArtifactType,
    FileCategory, MemoryArtifactSink, ProjectFile,
};
pub use context::StepContext;
pub use error::{StepError, WorkflowError, WorkflowResult};
pub use orchestrator::{JobRun, RunMode, RunOptions, RunSummary, WorkflowOrchestrator};
pub use payload::JobTrigger;
pub use registry::{StepName, WORKFLOW_STEPS};
pub use reliability::{with_reliability, ReliabilityOptions, ReliableStep, WorkflowLog};
pub use script::{Script, ScriptLine};
pub use state::{Job, JobStatus, SkipReason, StepState, StepStatus, StepUpdate};
pub use step::{step_fn, StepImplementation, StepImplementations, StepOutput};
pub use step_dir::StepRunDir;
pub use store::{JobRepository, MemoryStore, StepStateStore};
pub use timeline::{FsTimelineStore, TimelineData, TimelineOperation, TimelineStore};
