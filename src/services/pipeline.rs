//! Ordered reconcile pipeline.
//!
//! A reconcile pass is a list of [`Step`]s run in order over one object.
//! Steps share a [`ConvergenceContext`] that lives for a single pass.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Resource;

/// What the executor does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop the pipeline successfully.
    Abort { requeue: bool },
}

/// Result of a pipeline run that did not fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Run the pass again soon.
    pub requeue: bool,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("step {step} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: DomainError,
    },
}

impl PipelineError {
    pub fn step(&self) -> &str {
        match self {
            Self::Step { step, .. } => step,
        }
    }

    pub fn source_error(&self) -> &DomainError {
        match self {
            Self::Step { source, .. } => source,
        }
    }
}

/// Per-pass state shared between steps.
#[derive(Debug, Clone)]
pub struct ConvergenceContext<T> {
    /// Deletion of the object is in flight.
    pub deleted: bool,
    /// Snapshot taken before the first step ran.
    pub original: T,
    /// Finalizer guarding remote cleanup, `None` when disabled.
    pub finalizer_name: Option<String>,
    /// Replaces the deletion-protection annotation when set.
    pub protection_override: Option<bool>,
}

impl<T: Resource> ConvergenceContext<T> {
    pub fn new(object: &T, finalizer_name: Option<String>, protection_override: Option<bool>) -> Self {
        Self {
            deleted: false,
            original: object.clone(),
            finalizer_name,
            protection_override,
        }
    }
}

/// One unit of reconcile work.
#[async_trait]
pub trait Step<T: Resource>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, object: &mut T, ctx: &mut ConvergenceContext<T>) -> DomainResult<Flow>;
}

/// Runs steps in order. Holds no state between runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineExecutor;

impl PipelineExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `steps` over `object`.
    ///
    /// The first error stops execution. Effects of earlier steps are not
    /// rolled back.
    pub async fn run<T: Resource>(
        &self,
        object: &mut T,
        ctx: &mut ConvergenceContext<T>,
        steps: &[Box<dyn Step<T>>],
    ) -> Result<ReconcileOutcome, PipelineError> {
        let span = info_span!("reconcile", kind = object.kind(), object = %object.key());

        async {
            for step in steps {
                let result = step
                    .run(object, ctx)
                    .instrument(info_span!("step", name = step.name()))
                    .await;
                let flow = match result {
                    Ok(flow) => flow,
                    Err(source) => {
                        return Err(PipelineError::Step {
                            step: step.name().to_string(),
                            source,
                        })
                    }
                };

                if let Flow::Abort { requeue } = flow {
                    debug!(step = step.name(), requeue, "Pipeline stopped");
                    return Ok(ReconcileOutcome { requeue });
                }
            }
            Ok::<_, PipelineError>(ReconcileOutcome::default())
        }
        .instrument(span)
        .await
    }
}
