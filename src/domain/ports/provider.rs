//! Git provider port traits.
//!
//! A [`GitProvider`] is the high-level adapter the convergence engine talks
//! to for one remote host. A [`ProviderFactory`] knows how to recognise an
//! endpoint of its provider type and how to connect to it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AccessTokenGrant, CiVariable, ConnectionSecret, DeletionPolicy, RemoteRepository,
    RepoDescriptor,
};

/// Port for a connected remote git-hosting backend.
///
/// Every operation is idempotent: it diffs the descriptor against live
/// remote state and applies only what is missing, so a pass interrupted
/// half-way is safe to re-run.
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// Provider type name, e.g. `gitlab`.
    fn provider_type(&self) -> &str;

    /// Clone URL of the repository.
    fn full_url(&self, repo: &RepoDescriptor) -> String;

    /// Fetch the remote repository. `None` means it does not exist.
    async fn read(&self, repo: &RepoDescriptor) -> DomainResult<Option<RemoteRepository>>;

    /// Create the repository and apply the full deploy-key set.
    async fn create(&self, repo: &RepoDescriptor) -> DomainResult<()>;

    /// Diff deploy keys and sync the display name. Returns whether anything
    /// changed remotely.
    async fn update(&self, repo: &RepoDescriptor) -> DomainResult<bool>;

    async fn delete(&self, repo: &RepoDescriptor) -> DomainResult<()>;

    async fn archive(&self, repo: &RepoDescriptor) -> DomainResult<()>;

    /// Remove the repository according to its deletion policy.
    ///
    /// `Retain` and unrecognised policies leave the repository untouched.
    async fn remove(&self, repo: &RepoDescriptor) -> DomainResult<()> {
        match repo.deletion_policy() {
            DeletionPolicy::Delete => self.delete(repo).await,
            DeletionPolicy::Archive => self.archive(repo).await,
            DeletionPolicy::Retain | DeletionPolicy::Unknown => {
                tracing::info!(
                    repo = %repo.full_path(),
                    policy = %repo.deletion_policy(),
                    "Retaining remote repository"
                );
                Ok(())
            }
        }
    }

    /// Commit template files that are missing (or must be removed) in one
    /// multi-file commit.
    async fn commit_template_files(&self, repo: &RepoDescriptor) -> DomainResult<()>;

    /// Select a valid project access token or mint a new one.
    async fn ensure_project_access_token(
        &self,
        repo: &RepoDescriptor,
        name: &str,
        uid_hint: Option<u64>,
    ) -> DomainResult<AccessTokenGrant>;

    /// Reconcile the managed subset of CI variables.
    async fn ensure_ci_variables(
        &self,
        repo: &RepoDescriptor,
        managed: &[String],
        variables: &[CiVariable],
    ) -> DomainResult<()>;
}

/// Port for constructing providers of one type.
pub trait ProviderFactory: Send + Sync {
    /// Provider type name this factory produces.
    fn provider_type(&self) -> &str;

    /// Whether `endpoint` points at a host of this provider type. Used for
    /// `auto` repository types.
    fn matches(&self, endpoint: &str) -> bool;

    /// Build a provider connected with the given secret.
    fn connect(&self, secret: &ConnectionSecret) -> DomainResult<Arc<dyn GitProvider>>;
}
