//! Domain models: descriptors, resources, remote state and configuration.

pub mod config;
pub mod connection;
pub mod remote;
pub mod repository;
pub mod resource;
pub mod status;

pub use config::{Config, GitLabConfig, LoggingConfig, DEFAULT_FINALIZER_NAME};
pub use connection::ConnectionSecret;
pub use remote::{
    AccessTokenGrant, AccessTokenRecord, CommitAction, CommitActionKind, NewAccessToken,
    RemoteDeployKey, RemoteRepository, TreePage,
};
pub use repository::{
    AccessTokenConfig, CiVariable, CreationPolicy, DeletionPolicy, DeployKey, FileOp,
    RepoDescriptor, AUTO_REPO_TYPE, DELETE_MARKER,
};
pub use resource::{Cluster, ClusterSpec, ObjectMeta, RepoObject, Resource, Tenant, TenantSpec};
pub use status::{LastAppliedCiVariables, Phase, RepoStatus};
