//! Repokeeper - declarative convergence of externally hosted git repositories
//!
//! Repokeeper keeps a repository on a git hosting service (GitLab today) in
//! line with the descriptor carried by an owning resource such as a tenant
//! or a cluster: existence, description, deploy keys, seeded files, CI
//! variables and a project access token. Deletion of the owner is guarded
//! by a finalizer and an optional protection annotation.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): resource models, errors and port traits
//! - **Service Layer** (`services`): the reconcile pipeline and its steps
//! - **Adapters** (`adapters`): GitLab REST client and in-memory backends
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use repokeeper::{Config, ProviderRegistry, Reconciler};
//! use repokeeper::adapters::gitlab::GitLabProviderFactory;
//!
//! let config = Config::default();
//! let registry = ProviderRegistry::new()
//!     .with(Arc::new(GitLabProviderFactory::new(config.gitlab.clone())));
//! let reconciler = Reconciler::new(&config, Arc::new(registry), secrets, store, vault);
//! let outcome = reconciler.reconcile(&mut tenant).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Cluster, Config, ConnectionSecret, DeletionPolicy, CreationPolicy, Phase, RepoDescriptor,
    RepoObject, RepoStatus, Resource, Tenant,
};
pub use domain::ports::{GitProvider, ObjectStore, ProviderFactory, RemoteApi, SecretSource, TokenVault};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{PipelineError, ProviderRegistry, ReconcileOutcome, Reconciler};
