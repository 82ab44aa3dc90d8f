//! Reconciler entry point: the standard pipeline for any repository owner.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::models::{Config, RepoObject};
use crate::domain::ports::{ObjectStore, SecretSource, TokenVault};

use super::deletion_lifecycle::{
    AddDeletionProtection, CheckIfDeleted, HandleDeletion, HandleFinalizer, UpdateObject,
};
use super::pipeline::{ConvergenceContext, PipelineError, PipelineExecutor, ReconcileOutcome, Step};
use super::provider_registry::ProviderRegistry;
use super::repo_convergence::RepoConvergence;

/// Runs one reconcile pass per call for objects of kind `T`.
pub struct Reconciler<T: RepoObject> {
    executor: PipelineExecutor,
    steps: Vec<Box<dyn Step<T>>>,
    finalizer_name: Option<String>,
    protection_override: Option<bool>,
}

impl<T: RepoObject> Reconciler<T> {
    /// Assemble the pipeline:
    /// `CheckIfDeleted, AddDeletionProtection, HandleDeletion,
    /// RepoConvergence, HandleFinalizer, UpdateObject`.
    pub fn new(
        config: &Config,
        registry: Arc<ProviderRegistry>,
        secrets: Arc<dyn SecretSource>,
        store: Arc<dyn ObjectStore<T>>,
        vault: Arc<dyn TokenVault>,
    ) -> Self {
        let convergence = RepoConvergence::new(registry, secrets, Arc::clone(&store), vault)
            .with_defaults(config.default_deletion_policy, config.default_creation_policy);

        let steps: Vec<Box<dyn Step<T>>> = vec![
            Box::new(CheckIfDeleted),
            Box::new(AddDeletionProtection {
                enabled: config.deletion_protection,
            }),
            Box::new(HandleDeletion),
            Box::new(convergence),
            Box::new(HandleFinalizer),
            Box::new(UpdateObject::new(store)),
        ];

        Self {
            executor: PipelineExecutor::new(),
            steps,
            finalizer_name: config.finalizer().map(str::to_string),
            protection_override: None,
        }
    }

    /// Force the deletion-protection decision regardless of annotations.
    pub fn with_protection_override(mut self, protected: Option<bool>) -> Self {
        self.protection_override = protected;
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run one pass over `object`.
    #[instrument(skip_all, fields(kind = object.kind(), object = %object.key()))]
    pub async fn reconcile(&self, object: &mut T) -> Result<ReconcileOutcome, PipelineError> {
        let mut ctx = ConvergenceContext::new(
            object,
            self.finalizer_name.clone(),
            self.protection_override,
        );

        match self.executor.run(object, &mut ctx, &self.steps).await {
            Ok(outcome) => {
                info!(requeue = outcome.requeue, "Reconcile finished");
                Ok(outcome)
            }
            Err(err) => {
                warn!(step = err.step(), error = %err.source_error(), "Reconcile failed");
                Err(err)
            }
        }
    }
}
