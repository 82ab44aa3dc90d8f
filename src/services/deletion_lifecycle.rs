//! Deletion lifecycle steps.
//!
//! A resource guarded by the finalizer stays in the store after deletion
//! is requested until these steps let the finalizer go. The remote
//! repository is removed in between, by [`RepoConvergence`], only when
//! [`HandleDeletion`] has allowed it.
//!
//! [`RepoConvergence`]: super::repo_convergence::RepoConvergence

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Resource, DEFAULT_FINALIZER_NAME};
use crate::domain::ports::ObjectStore;

use super::pipeline::{ConvergenceContext, Flow, Step};

/// Annotation that blocks deletion of the remote repository while `"true"`.
pub const DELETION_PROTECTION_ANNOTATION: &str = "repokeeper.io/deletion-protection";

/// Parse a protection value. Anything that is not a recognisable boolean
/// counts as protected.
pub fn parse_protection(value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "false" | "0" | "no" | "off" => false,
        _ => true,
    }
}

/// Records whether deletion of the object is in flight.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckIfDeleted;

#[async_trait]
impl<T: Resource> Step<T> for CheckIfDeleted {
    fn name(&self) -> &'static str {
        "CheckIfDeleted"
    }

    async fn run(&self, object: &mut T, ctx: &mut ConvergenceContext<T>) -> DomainResult<Flow> {
        ctx.deleted = object.metadata().deletion_timestamp.is_some();
        Ok(Flow::Continue)
    }
}

/// Stamps the deletion-protection annotation on live objects that carry
/// none. An existing value, whatever it is, is left alone.
#[derive(Debug, Clone, Copy)]
pub struct AddDeletionProtection {
    pub enabled: bool,
}

#[async_trait]
impl<T: Resource> Step<T> for AddDeletionProtection {
    fn name(&self) -> &'static str {
        "AddDeletionProtection"
    }

    async fn run(&self, object: &mut T, ctx: &mut ConvergenceContext<T>) -> DomainResult<Flow> {
        if !self.enabled || ctx.deleted {
            return Ok(Flow::Continue);
        }
        let annotations = &mut object.metadata_mut().annotations;
        if !annotations.contains_key(DELETION_PROTECTION_ANNOTATION) {
            annotations.insert(DELETION_PROTECTION_ANNOTATION.to_string(), "true".to_string());
            debug!("Added deletion protection");
        }
        Ok(Flow::Continue)
    }
}

/// Gate in front of remote removal.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandleDeletion;

impl HandleDeletion {
    fn is_protected<T: Resource>(object: &T, ctx: &ConvergenceContext<T>) -> bool {
        if let Some(value) = ctx.protection_override {
            return value;
        }
        object
            .metadata()
            .annotations
            .get(DELETION_PROTECTION_ANNOTATION)
            .is_some_and(|value| parse_protection(value))
    }
}

#[async_trait]
impl<T: Resource> Step<T> for HandleDeletion {
    fn name(&self) -> &'static str {
        "HandleDeletion"
    }

    async fn run(&self, object: &mut T, ctx: &mut ConvergenceContext<T>) -> DomainResult<Flow> {
        if !ctx.deleted {
            return Ok(Flow::Continue);
        }

        // With the finalizer disabled, the default one left on older objects
        // still guards them until HandleFinalizer drops it.
        let finalizer = ctx.finalizer_name.as_deref().unwrap_or(DEFAULT_FINALIZER_NAME);
        let has_finalizer = object.metadata().has_finalizer(finalizer);
        let protected = Self::is_protected(object, ctx);

        if has_finalizer && !protected {
            info!(object = %object.key(), "Deletion allowed");
            return Ok(Flow::Continue);
        }

        warn!(
            object = %object.key(),
            has_finalizer,
            protected,
            "Deletion blocked"
        );
        Err(DomainError::FinalizerNotRemoved)
    }
}

/// Keeps the finalizer in place while the object lives and drops it once
/// deletion went through.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandleFinalizer;

#[async_trait]
impl<T: Resource> Step<T> for HandleFinalizer {
    fn name(&self) -> &'static str {
        "HandleFinalizer"
    }

    async fn run(&self, object: &mut T, ctx: &mut ConvergenceContext<T>) -> DomainResult<Flow> {
        let meta = object.metadata_mut();
        match ctx.finalizer_name.as_deref() {
            Some(name) if !ctx.deleted => {
                if meta.add_finalizer(name) {
                    debug!(finalizer = name, "Added finalizer");
                }
            }
            Some(name) => {
                if meta.remove_finalizer(name) {
                    info!(finalizer = name, "Removed finalizer");
                }
            }
            // Finalizer disabled: release objects stamped while it was on.
            None => {
                if meta.remove_finalizer(DEFAULT_FINALIZER_NAME) {
                    info!(finalizer = DEFAULT_FINALIZER_NAME, "Removed finalizer");
                }
            }
        }
        Ok(Flow::Continue)
    }
}

/// Terminal step: persists whatever the earlier steps changed.
///
/// Metadata and spec go through [`ObjectStore::update`], status through
/// [`ObjectStore::update_status`], each only when it differs from the
/// snapshot. A write conflict requeues the object instead of failing.
pub struct UpdateObject<T: Resource> {
    store: Arc<dyn ObjectStore<T>>,
}

impl<T: Resource> UpdateObject<T> {
    pub fn new(store: Arc<dyn ObjectStore<T>>) -> Self {
        Self { store }
    }

    async fn persist(&self, object: &mut T, ctx: &ConvergenceContext<T>) -> DomainResult<()> {
        let original = &ctx.original;

        if object.metadata() != original.metadata() || object.spec() != original.spec() {
            let stored = self.store.update(object).await?;
            object.metadata_mut().resource_version = stored.metadata().resource_version;
            debug!(resource_version = stored.metadata().resource_version, "Updated object");
        }

        if object.status() != original.status() {
            match self.store.update_status(object).await {
                Ok(stored) => {
                    object.metadata_mut().resource_version = stored.metadata().resource_version;
                    debug!(resource_version = stored.metadata().resource_version, "Updated status");
                }
                // The store drops deleted objects once their finalizers are gone.
                Err(err) if err.is_not_found() && ctx.deleted => {
                    debug!("Object gone before status update");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Resource> Step<T> for UpdateObject<T> {
    fn name(&self) -> &'static str {
        "UpdateObject"
    }

    async fn run(&self, object: &mut T, ctx: &mut ConvergenceContext<T>) -> DomainResult<Flow> {
        match self.persist(object, ctx).await {
            Ok(()) => Ok(Flow::Abort { requeue: false }),
            Err(err) if err.is_conflict() => {
                info!(object = %object.key(), "Object changed concurrently, requeueing");
                Ok(Flow::Abort { requeue: true })
            }
            Err(err) => Err(err),
        }
    }
}
