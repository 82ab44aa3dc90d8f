//! Desired repository descriptor.
//!
//! A [`RepoDescriptor`] is the declarative target state of one remote
//! repository. It is attached to a tenant or cluster resource and supplied
//! fresh on every reconcile.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Template-file content reserved to mean "this file must not exist".
///
/// Only meaningful at the serialization boundary; in memory the intent is
/// carried by [`FileOp::Delete`]. A file whose legitimate content equals
/// this literal cannot be expressed.
pub const DELETE_MARKER: &str = "{delete}";

/// Repository type that selects the provider by matching the endpoint URL.
pub const AUTO_REPO_TYPE: &str = "auto";

/// Desired operation for a single template file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    /// Ensure the file exists, created with this content when absent.
    Write(String),
    /// Ensure the file is absent.
    Delete,
}

impl FileOp {
    /// Interpret serialized content, mapping [`DELETE_MARKER`] to `Delete`.
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into();
        if content == DELETE_MARKER {
            Self::Delete
        } else {
            Self::Write(content)
        }
    }

    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl Serialize for FileOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Write(content) => serializer.serialize_str(content),
            Self::Delete => serializer.serialize_str(DELETE_MARKER),
        }
    }
}

impl<'de> Deserialize<'de> for FileOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let content = String::deserialize(deserializer)?;
        Ok(Self::from_content(content))
    }
}

/// What happens to the remote repository when its owning resource is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Leave the repository untouched.
    #[default]
    Retain,
    /// Delete the repository from the provider.
    Delete,
    /// Archive the repository (read-only, kept on the provider).
    Archive,
    /// Any unrecognised value. Treated like `Retain`.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Retain => "Retain",
            Self::Delete => "Delete",
            Self::Archive => "Archive",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Whether the engine may create the repository when it is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CreationPolicy {
    /// Create the repository when it does not exist.
    #[default]
    Create,
    /// Only manage a repository that already exists.
    Adopt,
}

/// An SSH public key authorized against the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployKey {
    /// Key algorithm, e.g. `ssh-ed25519`.
    #[serde(rename = "type")]
    pub key_type: String,
    /// Base64 key material.
    pub key: String,
    /// Grants push access when true.
    #[serde(default)]
    pub write_access: bool,
}

impl DeployKey {
    pub fn new(key_type: impl Into<String>, key: impl Into<String>, write_access: bool) -> Self {
        Self {
            key_type: key_type.into(),
            key: key.into(),
            write_access,
        }
    }

    /// The key in `authorized_keys` form: `<type> <key>`.
    pub fn authorized_key(&self) -> String {
        if self.key_type.is_empty() {
            self.key.clone()
        } else {
            format!("{} {}", self.key_type, self.key)
        }
    }

    /// Parse an `authorized_keys` line as returned by a provider.
    ///
    /// A trailing comment is dropped so that provider-added comments do
    /// not register as a difference.
    pub fn from_authorized_key(line: &str, write_access: bool) -> Self {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(key_type), Some(key)) => Self::new(key_type, key, write_access),
            (Some(key), None) => Self::new("", key, write_access),
            _ => Self::new("", "", write_access),
        }
    }
}

/// A CI/CD variable to set on the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiVariable {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub masked: bool,
    #[serde(default)]
    pub protected: bool,
}

impl CiVariable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            masked: false,
            protected: false,
        }
    }
}

/// Project access token requested for the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenConfig {
    /// Token name on the provider.
    pub name: String,
}

/// Declarative target state for one remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDescriptor {
    /// Namespace (group) path the repository lives under.
    #[serde(default)]
    pub path: String,
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Provider type name, or [`AUTO_REPO_TYPE`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_type: Option<String>,
    #[serde(default)]
    pub deploy_keys: BTreeMap<String, DeployKey>,
    #[serde(default)]
    pub template_files: BTreeMap<String, FileOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_policy: Option<CreationPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessTokenConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ci_variables: Vec<CiVariable>,
}

impl RepoDescriptor {
    pub fn new(path: impl Into<String>, repo_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            repo_name: repo_name.into(),
            ..Default::default()
        }
    }

    /// Full repository path on the provider, e.g. `group/sub/repo`.
    pub fn full_path(&self) -> String {
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            self.repo_name.clone()
        } else {
            format!("{path}/{}", self.repo_name)
        }
    }

    /// Effective repository type; unset means [`AUTO_REPO_TYPE`].
    pub fn repo_type(&self) -> &str {
        self.repo_type.as_deref().unwrap_or(AUTO_REPO_TYPE)
    }

    /// Effective display name; falls back to the repository name.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.repo_name)
    }

    pub fn deletion_policy(&self) -> DeletionPolicy {
        self.deletion_policy.unwrap_or_default()
    }

    pub fn creation_policy(&self) -> CreationPolicy {
        self.creation_policy.unwrap_or_default()
    }

    pub fn with_deploy_key(mut self, name: impl Into<String>, key: DeployKey) -> Self {
        self.deploy_keys.insert(name.into(), key);
        self
    }

    pub fn with_template_file(mut self, path: impl Into<String>, op: FileOp) -> Self {
        self.template_files.insert(path.into(), op);
        self
    }

    pub fn with_ci_variable(mut self, variable: CiVariable) -> Self {
        self.ci_variables.push(variable);
        self
    }
}
