//! Generic [`GitProvider`] over any [`RemoteApi`].
//!
//! The convergence algorithms (deploy-key diff, display-name sync, file
//! sync, CI variables, access tokens) are written once here. Backends only
//! supply the raw REST calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AccessTokenGrant, CiVariable, DeployKey, RemoteDeployKey, RemoteRepository, RepoDescriptor,
};
use crate::domain::ports::{Clock, GitProvider, RemoteApi};

use super::access_token::ensure_access_token;
use super::ci_variables::reconcile_ci_variables;
use super::file_sync::sync_template_files;
use super::key_diff::DeployKeyDelta;

/// Deploy keys listed remotely, indexed by title.
struct RemoteKeys {
    by_title: BTreeMap<String, (u64, DeployKey)>,
    /// Extra keys sharing a title with an earlier one.
    duplicates: Vec<RemoteDeployKey>,
}

impl RemoteKeys {
    fn from_listing(listing: Vec<RemoteDeployKey>) -> Self {
        let mut by_title = BTreeMap::new();
        let mut duplicates = Vec::new();
        for remote in listing {
            if by_title.contains_key(&remote.title) {
                duplicates.push(remote);
                continue;
            }
            let key = DeployKey::from_authorized_key(&remote.key, remote.can_push);
            by_title.insert(remote.title.clone(), (remote.id, key));
        }
        Self { by_title, duplicates }
    }

    fn values(&self) -> BTreeMap<String, DeployKey> {
        self.by_title
            .iter()
            .map(|(title, (_, key))| (title.clone(), key.clone()))
            .collect()
    }
}

/// A provider driving a [`RemoteApi`] backend.
pub struct RemoteProvider<A> {
    api: A,
    clock: Arc<dyn Clock>,
}

impl<A: RemoteApi> RemoteProvider<A> {
    pub fn new(api: A, clock: Arc<dyn Clock>) -> Self {
        Self { api, clock }
    }

    /// Apply the deploy-key delta. Returns whether anything changed.
    ///
    /// Every key is attempted; keys that succeed stay applied even when
    /// others fail.
    async fn sync_deploy_keys(&self, repo: &RepoDescriptor) -> DomainResult<bool> {
        let full_path = repo.full_path();
        let remote = RemoteKeys::from_listing(self.api.list_deploy_keys(&full_path).await?);
        let delta = DeployKeyDelta::between(&repo.deploy_keys, &remote.values());

        if delta.is_empty() && remote.duplicates.is_empty() {
            debug!(repo = %full_path, "Deploy keys in sync");
            return Ok(false);
        }

        let mut changed = false;
        let mut errors = Vec::new();
        let attempted = delta.add.len() + delta.remove.len() + remote.duplicates.len();

        for (title, key) in &delta.add {
            if let Some((id, _)) = remote.by_title.get(title) {
                // No in-place edit: drop the stale copy, then re-add under the same title.
                if let Err(err) = self.api.delete_deploy_key(&full_path, *id).await {
                    errors.push(format!("replace {title}: {err}"));
                    continue;
                }
                changed = true;
            }
            match self.api.add_deploy_key(&full_path, title, key).await {
                Ok(()) => {
                    info!(repo = %full_path, key = %title, write_access = key.write_access, "Added deploy key");
                    changed = true;
                }
                Err(err) => {
                    warn!(repo = %full_path, key = %title, error = %err, "Failed to add deploy key");
                    errors.push(format!("add {title}: {err}"));
                }
            }
        }

        let stale = delta
            .remove
            .keys()
            .filter_map(|title| remote.by_title.get(title).map(|(id, _)| (title.as_str(), *id)))
            .chain(remote.duplicates.iter().map(|d| (d.title.as_str(), d.id)));
        for (title, id) in stale {
            match self.api.delete_deploy_key(&full_path, id).await {
                Ok(()) => {
                    info!(repo = %full_path, key = title, "Removed deploy key");
                    changed = true;
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => errors.push(format!("remove {title}: {err}")),
            }
        }

        DomainError::aggregate("deploy keys", attempted, errors)?;
        Ok(changed)
    }

    /// Re-read the repository and align its description with the display name.
    async fn sync_display_name(&self, repo: &RepoDescriptor) -> DomainResult<bool> {
        let full_path = repo.full_path();
        let remote = self
            .api
            .get_project(&full_path)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("repository {full_path}")))?;

        let desired = repo.display_name();
        if remote.description == desired {
            return Ok(false);
        }

        info!(repo = %full_path, from = %remote.description, to = desired, "Updating repository description");
        self.api
            .edit_project_description(&full_path, desired)
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl<A: RemoteApi + 'static> GitProvider for RemoteProvider<A> {
    fn provider_type(&self) -> &str {
        self.api.provider_type()
    }

    fn full_url(&self, repo: &RepoDescriptor) -> String {
        let full_path = repo.full_path();
        let host = reqwest::Url::parse(self.api.base_url())
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));
        match host {
            Some(host) => format!("ssh://git@{host}/{full_path}.git"),
            None => format!("{}/{full_path}.git", self.api.base_url()),
        }
    }

    async fn read(&self, repo: &RepoDescriptor) -> DomainResult<Option<RemoteRepository>> {
        self.api.get_project(&repo.full_path()).await
    }

    #[instrument(skip(self, repo), fields(repo = %repo.full_path()))]
    async fn create(&self, repo: &RepoDescriptor) -> DomainResult<()> {
        let created = self
            .api
            .create_project(&repo.path, &repo.repo_name, repo.display_name())
            .await?;
        info!(id = created.id, "Created remote repository");

        // Freshly created: nothing to diff against.
        let full_path = repo.full_path();
        let mut errors = Vec::new();
        for (title, key) in &repo.deploy_keys {
            if let Err(err) = self.api.add_deploy_key(&full_path, title, key).await {
                warn!(key = %title, error = %err, "Failed to add deploy key");
                errors.push(format!("add {title}: {err}"));
            }
        }
        DomainError::aggregate("deploy keys", repo.deploy_keys.len(), errors)
    }

    #[instrument(skip(self, repo), fields(repo = %repo.full_path()))]
    async fn update(&self, repo: &RepoDescriptor) -> DomainResult<bool> {
        let keys_changed = self.sync_deploy_keys(repo).await?;
        let name_changed = self.sync_display_name(repo).await?;
        Ok(keys_changed || name_changed)
    }

    async fn delete(&self, repo: &RepoDescriptor) -> DomainResult<()> {
        let full_path = repo.full_path();
        match self.api.delete_project(&full_path).await {
            Ok(()) => {
                info!(repo = %full_path, "Deleted remote repository");
                Ok(())
            }
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn archive(&self, repo: &RepoDescriptor) -> DomainResult<()> {
        let full_path = repo.full_path();
        match self.api.get_project(&full_path).await? {
            Some(remote) if remote.archived => {
                debug!(repo = %full_path, "Remote repository already archived");
                Ok(())
            }
            Some(_) => {
                self.api.archive_project(&full_path).await?;
                info!(repo = %full_path, "Archived remote repository");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn commit_template_files(&self, repo: &RepoDescriptor) -> DomainResult<()> {
        if repo.template_files.is_empty() {
            return Ok(());
        }
        let default_branch = self
            .api
            .get_project(&repo.full_path())
            .await?
            .and_then(|remote| remote.default_branch);
        sync_template_files(&self.api, repo, default_branch.as_deref()).await?;
        Ok(())
    }

    async fn ensure_project_access_token(
        &self,
        repo: &RepoDescriptor,
        name: &str,
        uid_hint: Option<u64>,
    ) -> DomainResult<AccessTokenGrant> {
        ensure_access_token(&self.api, self.clock.as_ref(), &repo.full_path(), name, uid_hint).await
    }

    async fn ensure_ci_variables(
        &self,
        repo: &RepoDescriptor,
        managed: &[String],
        variables: &[CiVariable],
    ) -> DomainResult<()> {
        let report = reconcile_ci_variables(&self.api, &repo.full_path(), managed, variables).await?;
        debug!(
            repo = %repo.full_path(),
            deleted = report.deleted,
            updated = report.updated,
            created = report.created,
            "CI variables reconciled"
        );
        Ok(())
    }
}
