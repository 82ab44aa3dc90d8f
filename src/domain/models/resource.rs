//! Owning resources that carry a repository descriptor.
//!
//! The convergence engine never depends on a concrete resource kind. It
//! works against the [`Resource`] and [`RepoObject`] capability traits,
//! implemented here for [`Tenant`] and [`Cluster`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::repository::{CreationPolicy, DeletionPolicy, RepoDescriptor};
use super::status::RepoStatus;

/// Standard object metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Optimistic-concurrency token maintained by the object store.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add `finalizer` unless already present. Returns whether it was added.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove every occurrence of `finalizer`. Returns whether any was removed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }
}

/// A stored object the reconcile pipeline can operate on.
///
/// Spec and status are exposed separately so the terminal pipeline step can
/// decide which of them changed and persist each through its own call.
pub trait Resource: Clone + Send + Sync + 'static {
    type Spec: PartialEq + Send + Sync;
    type Status: Clone + PartialEq + Send + Sync;

    /// Resource kind name, used in logs and conflict errors.
    fn kind(&self) -> &'static str;
    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
    fn spec(&self) -> &Self::Spec;
    fn status(&self) -> &Self::Status;
    fn status_mut(&mut self) -> &mut Self::Status;

    /// `namespace/name`.
    fn key(&self) -> String {
        let meta = self.metadata();
        format!("{}/{}", meta.namespace, meta.name)
    }
}

/// Capability interface for resources that own a remote repository.
pub trait RepoObject: Resource {
    fn git_template(&self) -> Option<&RepoDescriptor>;
    fn git_template_mut(&mut self) -> Option<&mut RepoDescriptor>;
    /// Name of the tenant this object belongs to. Also names the
    /// connection secret.
    fn tenant_ref(&self) -> &str;
    fn deletion_policy(&self) -> Option<DeletionPolicy>;
    fn creation_policy(&self) -> Option<CreationPolicy>;
    fn display_name(&self) -> Option<&str>;
    fn repo_status(&self) -> &RepoStatus;
    fn repo_status_mut(&mut self) -> &mut RepoStatus;

    /// Record where the repository lives and which host keys to trust.
    fn set_repository_info(&mut self, url: String, host_keys: Option<String>) {
        let status = self.repo_status_mut();
        status.url = Some(url);
        status.host_keys = host_keys;
    }
}

/// Spec of a [`Tenant`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_policy: Option<CreationPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_template: Option<RepoDescriptor>,
}

/// A tenant: an organisational unit owning a repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tenant {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TenantSpec,
    #[serde(default)]
    pub status: RepoStatus,
}

impl Tenant {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: TenantSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: RepoStatus::default(),
        }
    }
}

impl Resource for Tenant {
    type Spec = TenantSpec;
    type Status = RepoStatus;

    fn kind(&self) -> &'static str {
        "Tenant"
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &TenantSpec {
        &self.spec
    }

    fn status(&self) -> &RepoStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut RepoStatus {
        &mut self.status
    }
}

impl RepoObject for Tenant {
    fn git_template(&self) -> Option<&RepoDescriptor> {
        self.spec.git_template.as_ref()
    }

    fn git_template_mut(&mut self) -> Option<&mut RepoDescriptor> {
        self.spec.git_template.as_mut()
    }

    fn tenant_ref(&self) -> &str {
        &self.metadata.name
    }

    fn deletion_policy(&self) -> Option<DeletionPolicy> {
        self.spec.deletion_policy
    }

    fn creation_policy(&self) -> Option<CreationPolicy> {
        self.spec.creation_policy
    }

    fn display_name(&self) -> Option<&str> {
        self.spec.display_name.as_deref()
    }

    fn repo_status(&self) -> &RepoStatus {
        &self.status
    }

    fn repo_status_mut(&mut self) -> &mut RepoStatus {
        &mut self.status
    }
}

/// Spec of a [`Cluster`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Owning tenant.
    #[serde(default)]
    pub tenant_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_policy: Option<CreationPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_template: Option<RepoDescriptor>,
}

/// A cluster belonging to a tenant, with its own configuration repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cluster {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: RepoStatus,
}

impl Cluster {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: ClusterSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: RepoStatus::default(),
        }
    }
}

impl Resource for Cluster {
    type Spec = ClusterSpec;
    type Status = RepoStatus;

    fn kind(&self) -> &'static str {
        "Cluster"
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    fn status(&self) -> &RepoStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut RepoStatus {
        &mut self.status
    }
}

impl RepoObject for Cluster {
    fn git_template(&self) -> Option<&RepoDescriptor> {
        self.spec.git_template.as_ref()
    }

    fn git_template_mut(&mut self) -> Option<&mut RepoDescriptor> {
        self.spec.git_template.as_mut()
    }

    fn tenant_ref(&self) -> &str {
        &self.spec.tenant_ref
    }

    fn deletion_policy(&self) -> Option<DeletionPolicy> {
        self.spec.deletion_policy
    }

    fn creation_policy(&self) -> Option<CreationPolicy> {
        self.spec.creation_policy
    }

    fn display_name(&self) -> Option<&str> {
        self.spec.display_name.as_deref()
    }

    fn repo_status(&self) -> &RepoStatus {
        &self.status
    }

    fn repo_status_mut(&mut self) -> &mut RepoStatus {
        &mut self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_helpers_are_idempotent() {
        let mut meta = ObjectMeta::new("ns", "acme");
        assert!(meta.add_finalizer("repokeeper.io/finalizer"));
        assert!(!meta.add_finalizer("repokeeper.io/finalizer"));
        assert_eq!(meta.finalizers.len(), 1);
        assert!(meta.remove_finalizer("repokeeper.io/finalizer"));
        assert!(!meta.remove_finalizer("repokeeper.io/finalizer"));
    }

    #[test]
    fn test_tenant_ref_per_kind() {
        let tenant = Tenant::new("ns", "acme", TenantSpec::default());
        assert_eq!(tenant.tenant_ref(), "acme");

        let cluster = Cluster::new(
            "ns",
            "prod-1",
            ClusterSpec {
                tenant_ref: "acme".into(),
                ..Default::default()
            },
        );
        assert_eq!(cluster.tenant_ref(), "acme");
        assert_eq!(cluster.key(), "ns/prod-1");
    }

    #[test]
    fn test_set_repository_info() {
        let mut tenant = Tenant::new("ns", "acme", TenantSpec::default());
        tenant.set_repository_info("git@example.com:foo/bar.git".into(), Some("hk".into()));
        assert_eq!(tenant.status.url.as_deref(), Some("git@example.com:foo/bar.git"));
        assert_eq!(tenant.status.host_keys.as_deref(), Some("hk"));
    }

    #[test]
    fn test_cluster_yaml() {
        let yaml = r"
metadata:
  name: prod-1
  namespace: tenants
  finalizers: [repokeeper.io/finalizer]
spec:
  tenantRef: acme
  gitTemplate:
    path: acme
    repoName: prod-1
";
        let cluster: Cluster = serde_yaml::from_str(yaml).unwrap();
        assert!(cluster.metadata.has_finalizer("repokeeper.io/finalizer"));
        assert_eq!(cluster.git_template().unwrap().full_path(), "acme/prod-1");
        assert_eq!(cluster.status, RepoStatus::default());
    }
}
