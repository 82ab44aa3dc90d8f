//! Repository convergence step.
//!
//! Drives the remote repository of any [`RepoObject`] towards its git
//! template: create or adopt, template files, deploy keys and display
//! name, CI variables, access token. On deletion it removes the
//! repository according to policy instead.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConnectionSecret, CreationPolicy, DeletionPolicy, LastAppliedCiVariables, Phase, RepoDescriptor,
    RepoObject, AUTO_REPO_TYPE,
};
use crate::domain::ports::{GitProvider, ObjectStore, SecretSource, TokenVault};

use super::pipeline::{ConvergenceContext, Flow, Step};
use super::provider_registry::ProviderRegistry;

/// Pipeline step converging the remote repository of a [`RepoObject`].
pub struct RepoConvergence<T: RepoObject> {
    registry: Arc<ProviderRegistry>,
    secrets: Arc<dyn SecretSource>,
    store: Arc<dyn ObjectStore<T>>,
    vault: Arc<dyn TokenVault>,
    default_deletion_policy: DeletionPolicy,
    default_creation_policy: CreationPolicy,
}

impl<T: RepoObject> RepoConvergence<T> {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        secrets: Arc<dyn SecretSource>,
        store: Arc<dyn ObjectStore<T>>,
        vault: Arc<dyn TokenVault>,
    ) -> Self {
        Self {
            registry,
            secrets,
            store,
            vault,
            default_deletion_policy: DeletionPolicy::default(),
            default_creation_policy: CreationPolicy::default(),
        }
    }

    pub fn with_defaults(mut self, deletion: DeletionPolicy, creation: CreationPolicy) -> Self {
        self.default_deletion_policy = deletion;
        self.default_creation_policy = creation;
        self
    }

    /// Fill unset descriptor fields from the object and the global defaults.
    /// Returns a copy of the completed descriptor.
    fn backfill_defaults(&self, object: &mut T) -> Option<RepoDescriptor> {
        let display_name = object.display_name().map(str::to_string);
        let deletion = object.deletion_policy().unwrap_or(self.default_deletion_policy);
        let creation = object.creation_policy().unwrap_or(self.default_creation_policy);

        let repo = object.git_template_mut()?;
        if repo.display_name.is_none() {
            repo.display_name = Some(display_name.unwrap_or_else(|| repo.repo_name.clone()));
        }
        repo.deletion_policy.get_or_insert(deletion);
        repo.creation_policy.get_or_insert(creation);
        if repo.repo_type.is_none() {
            repo.repo_type = Some(AUTO_REPO_TYPE.to_string());
        }
        Some(repo.clone())
    }

    async fn connection_secret(&self, object: &T) -> DomainResult<Option<ConnectionSecret>> {
        let namespace = &object.metadata().namespace;
        let name = object.tenant_ref();
        match self.secrets.get_secret(namespace, name).await? {
            Some(data) => ConnectionSecret::from_data(name, &data).map(Some),
            None => Ok(None),
        }
    }

    /// Stamp phase `failed`, persist it right away and hand back `original`.
    async fn fail(&self, object: &mut T, original: DomainError) -> DomainError {
        object.repo_status_mut().phase = Phase::Failed;
        match self.store.update_status(object).await {
            Ok(stored) => {
                object.metadata_mut().resource_version = stored.metadata().resource_version;
                original
            }
            Err(persist) => DomainError::StatusPersist {
                original: Box::new(original),
                persist: Box::new(persist),
            },
        }
    }

    /// Apply the CI variable set unless it matches what was last applied.
    async fn converge_ci_variables(
        &self,
        object: &mut T,
        provider: &dyn GitProvider,
        repo: &RepoDescriptor,
    ) -> DomainResult<()> {
        let previous = object.repo_status().last_applied_ci_variables.clone();
        let record = LastAppliedCiVariables::from_desired(&repo.ci_variables)?;
        if previous.as_ref() == Some(&record) {
            debug!("CI variables unchanged since last pass");
            return Ok(());
        }

        let managed: Vec<String> = previous
            .iter()
            .flat_map(|p| p.names.iter().cloned())
            .chain(record.names.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if managed.is_empty() {
            object.repo_status_mut().last_applied_ci_variables = None;
            return Ok(());
        }

        provider
            .ensure_ci_variables(repo, &managed, &repo.ci_variables)
            .await?;
        info!(variables = repo.ci_variables.len(), "Applied CI variables");
        object.repo_status_mut().last_applied_ci_variables =
            (!record.names.is_empty()).then_some(record);
        Ok(())
    }

    async fn converge_access_token(
        &self,
        object: &mut T,
        provider: &dyn GitProvider,
        repo: &RepoDescriptor,
    ) -> DomainResult<()> {
        let Some(config) = &repo.access_token else {
            return Ok(());
        };

        let hint = object.repo_status().access_token_uid;
        let grant = provider
            .ensure_project_access_token(repo, &config.name, hint)
            .await?;
        if let Some(token) = &grant.token {
            self.vault
                .store_token(&repo.full_path(), &grant, token)
                .await?;
            info!(uid = grant.uid, "Stored new access token");
        }
        object.repo_status_mut().access_token_uid = Some(grant.uid);
        Ok(())
    }

    #[instrument(skip_all, fields(object = %object.key()))]
    async fn converge(&self, object: &mut T, ctx: &ConvergenceContext<T>) -> DomainResult<Flow> {
        if object.git_template().is_none() {
            debug!("No git template, nothing to converge");
            return Ok(Flow::Continue);
        }
        if object.tenant_ref().trim().is_empty() {
            return Err(DomainError::Configuration(format!(
                "{} {} has an empty tenant reference",
                object.kind(),
                object.key()
            )));
        }

        let Some(repo) = self.backfill_defaults(object) else {
            return Ok(Flow::Continue);
        };

        let secret = match self.connection_secret(object).await? {
            Some(secret) => secret,
            None if ctx.deleted => {
                warn!(secret = object.tenant_ref(), "Connection secret gone, skipping remote cleanup");
                return Ok(Flow::Continue);
            }
            None => {
                return Err(DomainError::Configuration(format!(
                    "connection secret {}/{} not found",
                    object.metadata().namespace,
                    object.tenant_ref()
                )))
            }
        };

        let factory = self.registry.resolve(repo.repo_type(), &secret.endpoint)?;
        let provider = factory.connect(&secret)?;
        let remote = provider.read(&repo).await?;

        if ctx.deleted {
            if remote.is_some() {
                provider.remove(&repo).await?;
            } else {
                debug!(repo = %repo.full_path(), "Remote repository already absent");
            }
            return Ok(Flow::Continue);
        }

        let existed = remote.is_some();
        if !existed {
            if repo.creation_policy() == CreationPolicy::Adopt {
                return Err(DomainError::NotFound(format!(
                    "repository {} does not exist and creation policy is Adopt",
                    repo.full_path()
                )));
            }
            object.repo_status_mut().phase = Phase::Creating;
            if let Err(err) = provider.create(&repo).await {
                return Err(self.fail(object, err).await);
            }
        }

        if let Err(err) = provider.commit_template_files(&repo).await {
            return Err(self.fail(object, err).await);
        }

        if existed && provider.update(&repo).await? {
            info!(repo = %repo.full_path(), "Updated remote repository");
        }

        self.converge_ci_variables(object, provider.as_ref(), &repo)
            .await?;
        self.converge_access_token(object, provider.as_ref(), &repo)
            .await?;

        object.repo_status_mut().provider_type = Some(provider.provider_type().to_string());
        object.set_repository_info(provider.full_url(&repo), secret.host_keys.clone());
        object.repo_status_mut().phase = Phase::Created;
        Ok(Flow::Continue)
    }
}

#[async_trait]
impl<T: RepoObject> Step<T> for RepoConvergence<T> {
    fn name(&self) -> &'static str {
        "RepoConvergence"
    }

    async fn run(&self, object: &mut T, ctx: &mut ConvergenceContext<T>) -> DomainResult<Flow> {
        self.converge(object, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryObjectStore, InMemoryRemote, InMemorySecretSource, InMemoryTokenVault,
        MemoryProviderFactory,
    };
    use crate::domain::models::{
        AccessTokenConfig, CiVariable, Cluster, ClusterSpec, DeployKey, FileOp, Tenant, TenantSpec,
    };
    use std::collections::BTreeMap;

    const ENDPOINT: &str = "memory://git.local";

    struct Harness {
        remote: InMemoryRemote,
        store: Arc<InMemoryObjectStore<Tenant>>,
        secrets: Arc<InMemorySecretSource>,
        vault: Arc<InMemoryTokenVault>,
        step: RepoConvergence<Tenant>,
    }

    async fn harness() -> Harness {
        let remote = InMemoryRemote::new(ENDPOINT);
        let registry = ProviderRegistry::new().with(Arc::new(MemoryProviderFactory::new(remote.clone())));
        let store = Arc::new(InMemoryObjectStore::<Tenant>::new());
        let secrets = Arc::new(InMemorySecretSource::new());
        let vault = Arc::new(InMemoryTokenVault::new());
        secrets
            .insert(
                "ns",
                "acme",
                BTreeMap::from([
                    ("endpoint".to_string(), ENDPOINT.to_string()),
                    ("token".to_string(), "secret".to_string()),
                    ("hostKeys".to_string(), "git.local ssh-ed25519 HOST".to_string()),
                ]),
            )
            .await;

        let step = RepoConvergence::new(
            Arc::new(registry),
            secrets.clone(),
            store.clone(),
            vault.clone(),
        );
        Harness {
            remote,
            store,
            secrets,
            vault,
            step,
        }
    }

    fn tenant(repo: Option<RepoDescriptor>) -> Tenant {
        Tenant::new(
            "ns",
            "acme",
            TenantSpec {
                display_name: Some("Acme Corp".into()),
                git_template: repo,
                ..Default::default()
            },
        )
    }

    fn repo() -> RepoDescriptor {
        RepoDescriptor::new("acme", "acme-config")
            .with_deploy_key("flux", DeployKey::new("ssh-ed25519", "AAA", false))
            .with_template_file("README.md", FileOp::Write("# acme".into()))
    }

    async fn run(h: &Harness, obj: &mut Tenant, deleted: bool) -> DomainResult<Flow> {
        let mut ctx = ConvergenceContext::new(obj, Some("repokeeper.io/finalizer".into()), None);
        ctx.deleted = deleted;
        h.step.run(obj, &mut ctx).await
    }

    #[tokio::test]
    async fn test_without_template_does_nothing() {
        let h = harness().await;
        let mut obj = tenant(None);
        assert_eq!(run(&h, &mut obj, false).await.unwrap(), Flow::Continue);
        assert!(h.remote.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_tenant_ref_is_configuration_error() {
        let remote = InMemoryRemote::new(ENDPOINT);
        let registry = ProviderRegistry::new().with(Arc::new(MemoryProviderFactory::new(remote)));
        let step = RepoConvergence::<Cluster>::new(
            Arc::new(registry),
            Arc::new(InMemorySecretSource::new()),
            Arc::new(InMemoryObjectStore::<Cluster>::new()),
            Arc::new(InMemoryTokenVault::new()),
        );
        let mut obj = Cluster::new(
            "ns",
            "c1",
            ClusterSpec {
                git_template: Some(repo()),
                ..Default::default()
            },
        );
        let mut ctx = ConvergenceContext::new(&obj, None, None);
        let err = step.run(&mut obj, &mut ctx).await.unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_create_backfills_and_records_status() {
        let h = harness().await;
        let mut obj = tenant(Some(repo()));

        run(&h, &mut obj, false).await.unwrap();

        let template = obj.spec.git_template.as_ref().unwrap();
        assert_eq!(template.display_name.as_deref(), Some("Acme Corp"));
        assert_eq!(template.repo_type.as_deref(), Some("auto"));
        assert_eq!(template.deletion_policy, Some(DeletionPolicy::Retain));
        assert_eq!(template.creation_policy, Some(CreationPolicy::Create));

        let project = h.remote.project("acme/acme-config").await.unwrap();
        assert_eq!(project.description, "Acme Corp");
        assert_eq!(h.remote.deploy_keys("acme/acme-config").await.len(), 1);
        assert!(h.remote.files("acme/acme-config").await.contains_key("README.md"));

        assert_eq!(obj.status.phase, Phase::Created);
        assert_eq!(obj.status.provider_type.as_deref(), Some("memory"));
        assert_eq!(obj.status.url.as_deref(), Some("ssh://git@git.local/acme/acme-config.git"));
        assert_eq!(obj.status.host_keys.as_deref(), Some("git.local ssh-ed25519 HOST"));
    }

    #[tokio::test]
    async fn test_second_pass_only_reads() {
        let h = harness().await;
        let mut obj = tenant(Some(repo().with_ci_variable(CiVariable::new("A", "1"))));
        run(&h, &mut obj, false).await.unwrap();
        h.remote.clear_calls().await;

        run(&h, &mut obj, false).await.unwrap();

        let mutating: Vec<_> = h
            .remote
            .calls()
            .await
            .into_iter()
            .filter(|c| !c.starts_with("get_") && !c.starts_with("list_"))
            .collect();
        assert!(mutating.is_empty(), "unexpected calls: {mutating:?}");
    }

    #[tokio::test]
    async fn test_ci_variable_removed_from_template_is_deleted() {
        let h = harness().await;
        let mut obj = tenant(Some(
            repo()
                .with_ci_variable(CiVariable::new("A", "1"))
                .with_ci_variable(CiVariable::new("B", "2")),
        ));
        run(&h, &mut obj, false).await.unwrap();
        h.remote
            .seed_variable("acme/acme-config", CiVariable::new("MANUAL", "x"))
            .await;

        obj.spec.git_template.as_mut().unwrap().ci_variables.retain(|v| v.key == "A");
        run(&h, &mut obj, false).await.unwrap();

        let vars = h.remote.variables("acme/acme-config").await;
        assert!(vars.contains_key("A"));
        assert!(!vars.contains_key("B"));
        assert!(vars.contains_key("MANUAL"));
        assert_eq!(
            obj.status.last_applied_ci_variables.as_ref().unwrap().names,
            vec!["A".to_string()]
        );
    }

    #[tokio::test]
    async fn test_access_token_handed_to_vault_once() {
        let h = harness().await;
        let mut template = repo();
        template.access_token = Some(AccessTokenConfig { name: "flux".into() });
        let mut obj = tenant(Some(template));

        run(&h, &mut obj, false).await.unwrap();
        let stored = h.vault.get("acme/acme-config").await.unwrap();
        assert_eq!(obj.status.access_token_uid, Some(stored.uid));

        run(&h, &mut obj, false).await.unwrap();
        assert_eq!(h.remote.call_count("create_access_token").await, 1);
        assert_eq!(obj.status.access_token_uid, Some(stored.uid));
    }

    #[tokio::test]
    async fn test_adopt_absent_repository_fails_without_create() {
        let h = harness().await;
        let mut obj = tenant(Some(repo()));
        obj.spec.creation_policy = Some(CreationPolicy::Adopt);

        let err = run(&h, &mut obj, false).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.remote.call_count("create_project").await, 0);
    }

    #[tokio::test]
    async fn test_adopt_existing_repository() {
        let h = harness().await;
        h.remote.seed_project("acme/acme-config").await;
        let mut obj = tenant(Some(repo()));
        obj.spec.creation_policy = Some(CreationPolicy::Adopt);

        run(&h, &mut obj, false).await.unwrap();
        assert_eq!(obj.status.phase, Phase::Created);
        assert_eq!(h.remote.deploy_keys("acme/acme-config").await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_persists_failed_phase() {
        let h = harness().await;
        let mut obj = h.store.insert(tenant(Some(repo()))).await;
        h.remote.fail_on("create_project", "quota exceeded").await;

        let err = run(&h, &mut obj, false).await.unwrap_err();
        assert!(matches!(err, DomainError::Provider(_)));

        let stored = h.store.get("ns", "acme").await.unwrap().unwrap();
        assert_eq!(stored.status.phase, Phase::Failed);
    }

    #[tokio::test]
    async fn test_failed_phase_persist_failure_wraps_both() {
        let h = harness().await;
        // Never stored: the status write fails with NotFound.
        let mut obj = tenant(Some(repo()));
        h.remote.fail_on("create_commit", "protected branch").await;

        let err = run(&h, &mut obj, false).await.unwrap_err();
        match err {
            DomainError::StatusPersist { original, persist } => {
                assert!(matches!(*original, DomainError::Provider(_)));
                assert!(persist.is_not_found());
            }
            other => panic!("Expected StatusPersist, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let h = harness().await;
        h.secrets.remove("ns", "acme").await;
        let mut obj = tenant(Some(repo()));

        let err = run(&h, &mut obj, false).await.unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));

        assert_eq!(run(&h, &mut obj, true).await.unwrap(), Flow::Continue);
        assert!(h.remote.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_deletion_removes_per_policy_without_create() {
        let h = harness().await;
        let mut obj = tenant(Some(repo()));
        obj.spec.deletion_policy = Some(DeletionPolicy::Delete);

        // Absent and deleted: nothing is created.
        run(&h, &mut obj, true).await.unwrap();
        assert_eq!(h.remote.call_count("create_project").await, 0);

        h.remote.seed_project("acme/acme-config").await;
        run(&h, &mut obj, true).await.unwrap();
        assert!(h.remote.project("acme/acme-config").await.is_none());
    }
}
