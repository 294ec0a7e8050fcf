//! Step implementation contract and lookup.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::context::StepContext;
use crate::error::StepError;
use crate::registry::{StepName, WORKFLOW_STEPS};

/// Optional JSON payload produced by a step.
pub type StepOutput = Option<serde_json::Value>;

/// Trait for the code that performs a pipeline step.
#[async_trait]
pub trait StepImplementation: Send + Sync {
    /// Run the step for the given context.
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError>;
}

/// Adapter turning an async closure into a [`StepImplementation`].
pub struct FnStep<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> StepImplementation for FnStep<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
{
    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, StepError> {
        (self.f)(ctx.clone()).await
    }
}

/// Wrap an async closure as a step implementation.
pub fn step_fn<F, Fut>(f: F) -> FnStep<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
{
    FnStep { f }
}

/// Implementations available for a run, keyed by step.
///
/// A step with no entry is recorded as SKIPPED `not_implemented`.
#[derive(Clone, Default)]
pub struct StepImplementations {
    steps: HashMap<StepName, Arc<dyn StepImplementation>>,
}

impl StepImplementations {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation, replacing any previous one.
    pub fn register<T: StepImplementation + 'static>(&mut self, step: StepName, implementation: T) {
        self.steps.insert(step, Arc::new(implementation));
    }

    /// Register an already shared implementation.
    pub fn register_arc(&mut self, step: StepName, implementation: Arc<dyn StepImplementation>) {
        self.steps.insert(step, implementation);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: StepImplementation + 'static>(mut self, step: StepName, implementation: T) -> Self {
        self.register(step, implementation);
        self
    }

    pub fn get(&self, step: StepName) -> Option<Arc<dyn StepImplementation>> {
        self.steps.get(&step).cloned()
    }

    pub fn has(&self, step: StepName) -> bool {
        self.steps.contains_key(&step)
    }

    /// Registered steps, in registry order.
    pub fn list(&self) -> Vec<StepName> {
        WORKFLOW_STEPS
            .iter()
            .copied()
            .filter(|s| self.steps.contains_key(s))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replace every implementation with `f(step, implementation)`.
    pub fn map<F>(self, f: F) -> Self
    where
        F: Fn(StepName, Arc<dyn StepImplementation>) -> Arc<dyn StepImplementation>,
    {
        let steps = self
            .steps
            .into_iter()
            .map(|(step, implementation)| (step, f(step, implementation)))
            .collect();
        Self { steps }
    }
}

impl std::fmt::Debug for StepImplementations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepImplementations")
            .field("steps", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct MockStep;

    #[async_trait]
    impl StepImplementation for MockStep {
        async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
            Ok(Some(serde_json::json!({"mock": true})))
        }
    }

    #[test]
    fn test_implementations_new() {
        let impls = StepImplementations::new();
        assert!(impls.is_empty());
        assert!(impls.list().is_empty());
    }

    #[test]
    fn test_list_in_registry_order() {
        let impls = StepImplementations::new()
            .with(StepName::FinalEncoding, MockStep)
            .with(StepName::ThemeSelection, MockStep);

        assert!(impls.has(StepName::ThemeSelection));
        assert!(!impls.has(StepName::ScriptGeneration));
        assert_eq!(
            impls.list(),
            vec![StepName::ThemeSelection, StepName::FinalEncoding]
        );
    }

    #[tokio::test]
    async fn test_step_fn_receives_context() {
        let step = step_fn(|ctx: StepContext| async move {
            Ok(Some(serde_json::json!({ "step": ctx.step_name.as_str() })))
        });
        let ctx = StepContext::new(Uuid::new_v4(), StepName::TitleGeneration, "/tmp");

        let output = step.run(&ctx).await.unwrap();
        assert_eq!(output, Some(serde_json::json!({"step": "title_generation"})));
    }

    #[tokio::test]
    async fn test_map_wraps_every_step() {
        struct Constant;

        #[async_trait]
        impl StepImplementation for Constant {
            async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, StepError> {
                Ok(Some(serde_json::json!("wrapped")))
            }
        }

        let impls = StepImplementations::new()
            .with(StepName::ThemeSelection, MockStep)
            .map(|_, _| Arc::new(Constant) as Arc<dyn StepImplementation>);

        let ctx = StepContext::new(Uuid::new_v4(), StepName::ThemeSelection, "/tmp");
        let output = impls
            .get(StepName::ThemeSelection)
            .unwrap()
            .run(&ctx)
            .await
            .unwrap();
        assert_eq!(output, Some(serde_json::json!("wrapped")));
    }
}
