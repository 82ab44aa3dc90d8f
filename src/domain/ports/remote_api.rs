//! Low-level remote API port.
//!
//! [`RemoteApi`] mirrors the REST surface a git-hosting backend offers.
//! Convergence algorithms are written once against this trait; each backend
//! (GitLab, the in-memory fake) only implements the raw calls.
//!
//! Projects are addressed by their full path (`group/sub/repo`).

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AccessTokenRecord, CiVariable, CommitAction, DeployKey, NewAccessToken, RemoteDeployKey,
    RemoteRepository, TreePage,
};

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Provider type name, e.g. `gitlab`.
    fn provider_type(&self) -> &str;

    /// Base URL of the instance, without trailing slash.
    fn base_url(&self) -> &str;

    /// `Ok(None)` when the project does not exist.
    async fn get_project(&self, full_path: &str) -> DomainResult<Option<RemoteRepository>>;

    async fn create_project(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
    ) -> DomainResult<RemoteRepository>;

    async fn edit_project_description(&self, full_path: &str, description: &str)
        -> DomainResult<()>;

    async fn delete_project(&self, full_path: &str) -> DomainResult<()>;

    async fn archive_project(&self, full_path: &str) -> DomainResult<()>;

    async fn list_deploy_keys(&self, full_path: &str) -> DomainResult<Vec<RemoteDeployKey>>;

    async fn add_deploy_key(&self, full_path: &str, title: &str, key: &DeployKey)
        -> DomainResult<()>;

    async fn delete_deploy_key(&self, full_path: &str, key_id: u64) -> DomainResult<()>;

    /// One page of the recursive tree. `page` is the cursor returned by the
    /// previous page, `None` for the first one. Fails with `NotFound` on an
    /// empty repository.
    async fn list_tree_page(&self, full_path: &str, page: Option<&str>) -> DomainResult<TreePage>;

    /// Submit all actions as one atomic commit.
    async fn create_commit(
        &self,
        full_path: &str,
        branch: &str,
        message: &str,
        actions: &[CommitAction],
    ) -> DomainResult<()>;

    /// Fails with `NotFound` when the variable does not exist.
    async fn update_ci_variable(&self, full_path: &str, variable: &CiVariable) -> DomainResult<()>;

    async fn create_ci_variable(&self, full_path: &str, variable: &CiVariable) -> DomainResult<()>;

    /// Fails with `NotFound` when the variable does not exist.
    async fn delete_ci_variable(&self, full_path: &str, key: &str) -> DomainResult<()>;

    async fn list_access_tokens(&self, full_path: &str) -> DomainResult<Vec<AccessTokenRecord>>;

    /// The returned record carries the secret token.
    async fn create_access_token(
        &self,
        full_path: &str,
        request: &NewAccessToken,
    ) -> DomainResult<AccessTokenRecord>;
}
