//! Common test utilities for integration tests
//!
//! Provides an in-memory world (remote, object store, secrets, vault) and
//! a reconciler wired against it.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use repokeeper::adapters::memory::{
    InMemoryObjectStore, InMemoryRemote, InMemorySecretSource, InMemoryTokenVault,
    MemoryProviderFactory,
};
use repokeeper::domain::models::{DeployKey, FileOp, RepoDescriptor, Tenant, TenantSpec};
use repokeeper::domain::ports::ObjectStore;
use repokeeper::{Config, ProviderRegistry, Reconciler};

pub const ENDPOINT: &str = "memory://git.example";
pub const NAMESPACE: &str = "tenants";
pub const TENANT: &str = "acme";
pub const FULL_PATH: &str = "acme/acme-config";

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub struct World {
    pub remote: InMemoryRemote,
    pub store: Arc<InMemoryObjectStore<Tenant>>,
    pub secrets: Arc<InMemorySecretSource>,
    pub vault: Arc<InMemoryTokenVault>,
    pub reconciler: Reconciler<Tenant>,
}

impl World {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        setup_test_logging();

        let remote = InMemoryRemote::new(ENDPOINT);
        let registry =
            ProviderRegistry::new().with(Arc::new(MemoryProviderFactory::new(remote.clone())));
        let store = Arc::new(InMemoryObjectStore::<Tenant>::new());
        let secrets = Arc::new(InMemorySecretSource::new());
        let vault = Arc::new(InMemoryTokenVault::new());
        secrets
            .insert(
                NAMESPACE,
                TENANT,
                BTreeMap::from([
                    ("endpoint".to_string(), ENDPOINT.to_string()),
                    ("token".to_string(), "glpat-test".to_string()),
                ]),
            )
            .await;

        let reconciler = Reconciler::new(
            &config,
            Arc::new(registry),
            secrets.clone(),
            store.clone(),
            vault.clone(),
        );

        Self {
            remote,
            store,
            secrets,
            vault,
            reconciler,
        }
    }

    /// Store `tenant` and return the stored copy.
    pub async fn admit(&self, tenant: Tenant) -> Tenant {
        self.store.insert(tenant).await
    }

    /// Fresh copy of the tenant as last persisted.
    pub async fn fetch(&self) -> Option<Tenant> {
        self.store
            .get(NAMESPACE, TENANT)
            .await
            .expect("in-memory store never fails a read")
    }
}

pub fn descriptor() -> RepoDescriptor {
    RepoDescriptor::new("acme", "acme-config")
        .with_deploy_key("flux", DeployKey::new("ssh-ed25519", "AAAAC3Nza-flux", false))
        .with_deploy_key("ci", DeployKey::new("ssh-ed25519", "AAAAC3Nza-ci", true))
        .with_template_file("README.md", FileOp::Write("# acme\n".into()))
        .with_template_file("clusters/.keep", FileOp::Write(String::new()))
}

pub fn tenant(repo: RepoDescriptor) -> Tenant {
    Tenant::new(
        NAMESPACE,
        TENANT,
        TenantSpec {
            display_name: Some("Acme Corporation".into()),
            git_template: Some(repo),
            ..Default::default()
        },
    )
}

/// Calls that change remote state.
pub async fn mutating_calls(remote: &InMemoryRemote) -> Vec<String> {
    remote
        .calls()
        .await
        .into_iter()
        .filter(|c| !c.starts_with("get_") && !c.starts_with("list_"))
        .collect()
}
