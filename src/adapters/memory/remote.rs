//! In-memory git-hosting backend.
//!
//! Behaves like a small GitLab: projects keyed by full path, deploy keys,
//! a flat file tree with page-number pagination, CI variables and access
//! tokens. Every call is recorded as `op:arg` and failures can be injected
//! per operation (`op`) or per operation and argument (`op:arg`).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AccessTokenRecord, CiVariable, CommitAction, CommitActionKind, DeployKey, NewAccessToken,
    RemoteDeployKey, RemoteRepository, TreePage,
};
use crate::domain::ports::RemoteApi;

const DEFAULT_TREE_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct ProjectState {
    repo: RemoteRepository,
    deploy_keys: Vec<RemoteDeployKey>,
    files: BTreeMap<String, String>,
    variables: BTreeMap<String, CiVariable>,
    tokens: Vec<AccessTokenRecord>,
    commit_branches: Vec<String>,
}

#[derive(Debug, Default)]
struct RemoteState {
    projects: BTreeMap<String, ProjectState>,
    next_id: u64,
    calls: Vec<String>,
    failures: BTreeMap<String, String>,
}

impl RemoteState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Record the call and return the injected failure, if any.
    fn record(&mut self, op: &str, arg: &str) -> DomainResult<()> {
        let call = format!("{op}:{arg}");
        let failure = self
            .failures
            .get(&call)
            .or_else(|| self.failures.get(op))
            .cloned();
        self.calls.push(call);
        match failure {
            Some(message) => Err(DomainError::Provider(message)),
            None => Ok(()),
        }
    }

    fn project_mut(&mut self, full_path: &str) -> DomainResult<&mut ProjectState> {
        self.projects
            .get_mut(full_path)
            .ok_or_else(|| DomainError::NotFound(format!("project {full_path}")))
    }
}

/// Shared, cloneable in-memory remote.
#[derive(Debug, Clone)]
pub struct InMemoryRemote {
    base_url: String,
    tree_page_size: usize,
    state: Arc<RwLock<RemoteState>>,
}

impl InMemoryRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tree_page_size: DEFAULT_TREE_PAGE_SIZE,
            state: Arc::new(RwLock::new(RemoteState::default())),
        }
    }

    pub fn with_tree_page_size(mut self, size: usize) -> Self {
        self.tree_page_size = size.max(1);
        self
    }

    /// Make calls matching `pattern` (`op` or `op:arg`) fail with `message`.
    pub async fn fail_on(&self, pattern: &str, message: &str) {
        self.state
            .write()
            .await
            .failures
            .insert(pattern.to_string(), message.to_string());
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.failures.clear();
    }

    /// Every recorded call, as `op:arg`.
    pub async fn calls(&self) -> Vec<String> {
        self.state.read().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    /// Number of recorded calls of operation `op`.
    pub async fn call_count(&self, op: &str) -> usize {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|call| call.split(':').next() == Some(op))
            .count()
    }

    pub async fn seed_project(&self, full_path: &str) {
        let mut state = self.state.write().await;
        let id = state.next_id();
        let project = self.new_project(id, full_path, "");
        state.projects.insert(full_path.to_string(), project);
    }

    pub async fn seed_file(&self, full_path: &str, path: &str, content: &str) {
        if let Some(project) = self.state.write().await.projects.get_mut(full_path) {
            project.files.insert(path.to_string(), content.to_string());
        }
    }

    pub async fn seed_deploy_key(&self, full_path: &str, title: &str, key: &str, can_push: bool) {
        let mut state = self.state.write().await;
        let id = state.next_id();
        if let Some(project) = state.projects.get_mut(full_path) {
            project.deploy_keys.push(RemoteDeployKey {
                id,
                title: title.to_string(),
                key: key.to_string(),
                can_push,
            });
        }
    }

    pub async fn seed_variable(&self, full_path: &str, variable: CiVariable) {
        if let Some(project) = self.state.write().await.projects.get_mut(full_path) {
            project.variables.insert(variable.key.clone(), variable);
        }
    }

    pub async fn seed_token(&self, full_path: &str, token: AccessTokenRecord) {
        let mut state = self.state.write().await;
        state.next_id = state.next_id.max(token.uid);
        if let Some(project) = state.projects.get_mut(full_path) {
            project.tokens.push(token);
        }
    }

    pub async fn project(&self, full_path: &str) -> Option<RemoteRepository> {
        self.state
            .read()
            .await
            .projects
            .get(full_path)
            .map(|p| p.repo.clone())
    }

    pub async fn deploy_keys(&self, full_path: &str) -> Vec<RemoteDeployKey> {
        self.state
            .read()
            .await
            .projects
            .get(full_path)
            .map(|p| p.deploy_keys.clone())
            .unwrap_or_default()
    }

    pub async fn files(&self, full_path: &str) -> BTreeMap<String, String> {
        self.state
            .read()
            .await
            .projects
            .get(full_path)
            .map(|p| p.files.clone())
            .unwrap_or_default()
    }

    pub async fn variables(&self, full_path: &str) -> BTreeMap<String, CiVariable> {
        self.state
            .read()
            .await
            .projects
            .get(full_path)
            .map(|p| p.variables.clone())
            .unwrap_or_default()
    }

    pub async fn tokens(&self, full_path: &str) -> Vec<AccessTokenRecord> {
        self.state
            .read()
            .await
            .projects
            .get(full_path)
            .map(|p| p.tokens.clone())
            .unwrap_or_default()
    }

    /// Branch of every commit made to the project, oldest first.
    pub async fn commit_branches(&self, full_path: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .projects
            .get(full_path)
            .map(|p| p.commit_branches.clone())
            .unwrap_or_default()
    }

    fn new_project(&self, id: u64, full_path: &str, description: &str) -> ProjectState {
        let host = self
            .base_url
            .split("://")
            .nth(1)
            .unwrap_or(&self.base_url)
            .to_string();
        ProjectState {
            repo: RemoteRepository {
                id,
                full_path: full_path.to_string(),
                description: description.to_string(),
                default_branch: Some("main".to_string()),
                web_url: format!("{}/{full_path}", self.base_url),
                ssh_url: format!("git@{host}:{full_path}.git"),
                archived: false,
            },
            deploy_keys: Vec::new(),
            files: BTreeMap::new(),
            variables: BTreeMap::new(),
            tokens: Vec::new(),
            commit_branches: Vec::new(),
        }
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    fn provider_type(&self) -> &str {
        "memory"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_project(&self, full_path: &str) -> DomainResult<Option<RemoteRepository>> {
        let mut state = self.state.write().await;
        state.record("get_project", full_path)?;
        Ok(state.projects.get(full_path).map(|p| p.repo.clone()))
    }

    async fn create_project(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
    ) -> DomainResult<RemoteRepository> {
        let namespace = namespace.trim_matches('/');
        let full_path = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}/{name}")
        };

        let mut state = self.state.write().await;
        state.record("create_project", &full_path)?;
        if state.projects.contains_key(&full_path) {
            return Err(DomainError::Conflict {
                kind: "project".to_string(),
                name: full_path,
            });
        }
        let id = state.next_id();
        let project = self.new_project(id, &full_path, description);
        let repo = project.repo.clone();
        state.projects.insert(full_path, project);
        Ok(repo)
    }

    async fn edit_project_description(&self, full_path: &str, description: &str) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.record("edit_project_description", full_path)?;
        state.project_mut(full_path)?.repo.description = description.to_string();
        Ok(())
    }

    async fn delete_project(&self, full_path: &str) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.record("delete_project", full_path)?;
        state
            .projects
            .remove(full_path)
            .map(|_| ())
            .ok_or_else(|| DomainError::NotFound(format!("project {full_path}")))
    }

    async fn archive_project(&self, full_path: &str) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.record("archive_project", full_path)?;
        state.project_mut(full_path)?.repo.archived = true;
        Ok(())
    }

    async fn list_deploy_keys(&self, full_path: &str) -> DomainResult<Vec<RemoteDeployKey>> {
        let mut state = self.state.write().await;
        state.record("list_deploy_keys", full_path)?;
        Ok(state.project_mut(full_path)?.deploy_keys.clone())
    }

    async fn add_deploy_key(&self, full_path: &str, title: &str, key: &DeployKey) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.record("add_deploy_key", title)?;
        let id = state.next_id();
        state.project_mut(full_path)?.deploy_keys.push(RemoteDeployKey {
            id,
            title: title.to_string(),
            key: key.authorized_key(),
            can_push: key.write_access,
        });
        Ok(())
    }

    async fn delete_deploy_key(&self, full_path: &str, key_id: u64) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.record("delete_deploy_key", &key_id.to_string())?;
        let project = state.project_mut(full_path)?;
        let before = project.deploy_keys.len();
        project.deploy_keys.retain(|k| k.id != key_id);
        if project.deploy_keys.len() == before {
            return Err(DomainError::NotFound(format!("deploy key {key_id}")));
        }
        Ok(())
    }

    async fn list_tree_page(&self, full_path: &str, page: Option<&str>) -> DomainResult<TreePage> {
        let mut state = self.state.write().await;
        state.record("list_tree_page", full_path)?;
        let project = state.project_mut(full_path)?;
        if project.files.is_empty() {
            return Err(DomainError::NotFound("Tree Not Found".to_string()));
        }

        let page: usize = page.and_then(|p| p.parse().ok()).unwrap_or(1).max(1);
        let paths: Vec<String> = project
            .files
            .keys()
            .skip((page - 1) * self.tree_page_size)
            .take(self.tree_page_size)
            .cloned()
            .collect();
        let next_page = (page * self.tree_page_size < project.files.len())
            .then(|| (page + 1).to_string());

        Ok(TreePage { paths, next_page })
    }

    async fn create_commit(
        &self,
        full_path: &str,
        branch: &str,
        _message: &str,
        actions: &[CommitAction],
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.record("create_commit", full_path)?;
        let project = state.project_mut(full_path)?;

        let mut seen = BTreeSet::new();
        for action in actions {
            if !seen.insert(action.path.as_str()) {
                return Err(DomainError::Provider(format!(
                    "duplicate commit action for {}",
                    action.path
                )));
            }
            let exists = project.files.contains_key(&action.path);
            match (&action.kind, exists) {
                (CommitActionKind::Create(_), true) => {
                    return Err(DomainError::Provider(format!(
                        "A file with this name already exists: {}",
                        action.path
                    )))
                }
                (CommitActionKind::Delete, false) => {
                    return Err(DomainError::Provider(format!(
                        "A file with this name doesn't exist: {}",
                        action.path
                    )))
                }
                _ => {}
            }
        }

        for action in actions {
            match &action.kind {
                CommitActionKind::Create(content) => {
                    project.files.insert(action.path.clone(), content.clone());
                }
                CommitActionKind::Delete => {
                    project.files.remove(&action.path);
                }
            }
        }
        project.commit_branches.push(branch.to_string());
        Ok(())
    }

    async fn update_ci_variable(&self, full_path: &str, variable: &CiVariable) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.record("update_ci_variable", &variable.key)?;
        let project = state.project_mut(full_path)?;
        match project.variables.get_mut(&variable.key) {
            Some(existing) => {
                *existing = variable.clone();
                Ok(())
            }
            None => Err(DomainError::NotFound(format!("variable {}", variable.key))),
        }
    }

    async fn create_ci_variable(&self, full_path: &str, variable: &CiVariable) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.record("create_ci_variable", &variable.key)?;
        let project = state.project_mut(full_path)?;
        if project.variables.contains_key(&variable.key) {
            return Err(DomainError::Conflict {
                kind: "variable".to_string(),
                name: variable.key.clone(),
            });
        }
        project.variables.insert(variable.key.clone(), variable.clone());
        Ok(())
    }

    async fn delete_ci_variable(&self, full_path: &str, key: &str) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.record("delete_ci_variable", key)?;
        state
            .project_mut(full_path)?
            .variables
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| DomainError::NotFound(format!("variable {key}")))
    }

    async fn list_access_tokens(&self, full_path: &str) -> DomainResult<Vec<AccessTokenRecord>> {
        let mut state = self.state.write().await;
        state.record("list_access_tokens", full_path)?;
        Ok(state
            .project_mut(full_path)?
            .tokens
            .iter()
            .cloned()
            .map(|mut t| {
                t.token = None;
                t
            })
            .collect())
    }

    async fn create_access_token(
        &self,
        full_path: &str,
        request: &NewAccessToken,
    ) -> DomainResult<AccessTokenRecord> {
        let mut state = self.state.write().await;
        state.record("create_access_token", &request.name)?;
        let uid = state.next_id();
        let record = AccessTokenRecord {
            uid,
            name: request.name.clone(),
            active: true,
            revoked: false,
            expires_at: request.expires_at,
            scopes: request.scopes.clone(),
            token: Some(format!("memtok-{uid}")),
        };
        state.project_mut(full_path)?.tokens.push(record.clone());
        Ok(record)
    }
}
