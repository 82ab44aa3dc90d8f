//! [`RemoteApi`] over the GitLab REST v4 API.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AccessTokenRecord, CiVariable, CommitAction, DeployKey, NewAccessToken, RemoteDeployKey,
    RemoteRepository, TreePage,
};
use crate::domain::ports::RemoteApi;

use super::client::GitLabClient;
use super::errors::GitLabError;
use super::models::{
    AccessToken, CommitActionBody, CreateAccessToken, CreateCommit, CreateDeployKey, CreateProject,
    DeployKey as GlDeployKey, Namespace, Project, TreeEntry, VariableBody,
};

pub const PROVIDER_TYPE: &str = "gitlab";

impl GitLabClient {
    /// Numeric id of the namespace at `full_path`.
    async fn namespace_id(&self, full_path: &str) -> Result<u64, GitLabError> {
        let url = self.url(&["namespaces", full_path])?;
        let namespace: Namespace = self.get(url).await?;
        debug!(namespace = %namespace.full_path, id = namespace.id, "Resolved namespace");
        Ok(namespace.id)
    }
}

#[async_trait]
impl RemoteApi for GitLabClient {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE
    }

    fn base_url(&self) -> &str {
        self.endpoint()
    }

    async fn get_project(&self, full_path: &str) -> DomainResult<Option<RemoteRepository>> {
        let url = self.url(&["projects", full_path])?;
        let project: Option<Project> = self.get_optional(url).await?;
        Ok(project.map(RemoteRepository::from))
    }

    #[instrument(skip(self, description))]
    async fn create_project(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
    ) -> DomainResult<RemoteRepository> {
        let namespace = namespace.trim_matches('/');
        let namespace_id = if namespace.is_empty() {
            None
        } else {
            Some(self.namespace_id(namespace).await?)
        };

        let body = CreateProject {
            name,
            path: name,
            namespace_id,
            description,
        };
        let project: Project = self.post(self.url(&["projects"])?, &body).await?;
        Ok(project.into())
    }

    async fn edit_project_description(&self, full_path: &str, description: &str) -> DomainResult<()> {
        let url = self.url(&["projects", full_path])?;
        self.put(url, &json!({ "description": description })).await?;
        Ok(())
    }

    async fn delete_project(&self, full_path: &str) -> DomainResult<()> {
        self.delete(self.url(&["projects", full_path])?).await?;
        Ok(())
    }

    async fn archive_project(&self, full_path: &str) -> DomainResult<()> {
        let url = self.url(&["projects", full_path, "archive"])?;
        self.post_empty::<serde_json::Value>(url, None).await?;
        Ok(())
    }

    async fn list_deploy_keys(&self, full_path: &str) -> DomainResult<Vec<RemoteDeployKey>> {
        let url = self.url(&["projects", full_path, "deploy_keys"])?;
        let keys: Vec<GlDeployKey> = self.get_all(url).await?;
        Ok(keys.into_iter().map(RemoteDeployKey::from).collect())
    }

    async fn add_deploy_key(&self, full_path: &str, title: &str, key: &DeployKey) -> DomainResult<()> {
        let url = self.url(&["projects", full_path, "deploy_keys"])?;
        let material = key.authorized_key();
        let body = CreateDeployKey {
            title,
            key: &material,
            can_push: key.write_access,
        };
        let _: GlDeployKey = self.post(url, &body).await?;
        Ok(())
    }

    async fn delete_deploy_key(&self, full_path: &str, key_id: u64) -> DomainResult<()> {
        let id = key_id.to_string();
        self.delete(self.url(&["projects", full_path, "deploy_keys", &id])?)
            .await?;
        Ok(())
    }

    async fn list_tree_page(&self, full_path: &str, page: Option<&str>) -> DomainResult<TreePage> {
        let mut url = self.url(&["projects", full_path, "repository", "tree"])?;
        url.query_pairs_mut().append_pair("recursive", "true");

        let listing = self.get_page::<TreeEntry>(url, page).await?;
        Ok(TreePage {
            paths: listing
                .items
                .into_iter()
                .filter(TreeEntry::is_blob)
                .map(|e| e.path)
                .collect(),
            next_page: listing.next_page,
        })
    }

    #[instrument(skip(self, message, actions), fields(actions = actions.len()))]
    async fn create_commit(
        &self,
        full_path: &str,
        branch: &str,
        message: &str,
        actions: &[CommitAction],
    ) -> DomainResult<()> {
        let url = self.url(&["projects", full_path, "repository", "commits"])?;
        let body = CreateCommit {
            branch,
            commit_message: message,
            actions: actions.iter().map(CommitActionBody::from).collect(),
        };
        self.post_empty(url, Some(&body)).await?;
        Ok(())
    }

    async fn update_ci_variable(&self, full_path: &str, variable: &CiVariable) -> DomainResult<()> {
        let url = self.url(&["projects", full_path, "variables", &variable.key])?;
        self.put(url, &VariableBody::from(variable)).await?;
        Ok(())
    }

    async fn create_ci_variable(&self, full_path: &str, variable: &CiVariable) -> DomainResult<()> {
        let url = self.url(&["projects", full_path, "variables"])?;
        self.post_empty(url, Some(&VariableBody::from(variable)))
            .await?;
        Ok(())
    }

    async fn delete_ci_variable(&self, full_path: &str, key: &str) -> DomainResult<()> {
        self.delete(self.url(&["projects", full_path, "variables", key])?)
            .await?;
        Ok(())
    }

    async fn list_access_tokens(&self, full_path: &str) -> DomainResult<Vec<AccessTokenRecord>> {
        let url = self.url(&["projects", full_path, "access_tokens"])?;
        let tokens: Vec<AccessToken> = self.get_all(url).await?;
        Ok(tokens.into_iter().map(AccessTokenRecord::from).collect())
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    async fn create_access_token(
        &self,
        full_path: &str,
        request: &NewAccessToken,
    ) -> DomainResult<AccessTokenRecord> {
        let url = self.url(&["projects", full_path, "access_tokens"])?;
        let body = CreateAccessToken {
            name: &request.name,
            scopes: &request.scopes,
            access_level: request.access_level,
            expires_at: request.expires_at.format("%Y-%m-%d").to_string(),
        };
        let token: AccessToken = self.post(url, &body).await?;
        if token.token.is_none() {
            return Err(DomainError::Provider(format!(
                "GitLab returned access token {} without its secret",
                token.id
            )));
        }
        Ok(token.into())
    }
}
