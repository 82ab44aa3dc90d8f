//! Remote provider state and the operations issued against it.
//!
//! Remote state is never cached between reconciles; every pass re-fetches
//! what it needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository as it exists on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub id: u64,
    pub full_path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub ssh_url: String,
    #[serde(default)]
    pub archived: bool,
}

/// A deploy key as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDeployKey {
    pub id: u64,
    pub title: String,
    pub key: String,
    #[serde(default)]
    pub can_push: bool,
}

/// One page of a recursive repository tree listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreePage {
    /// Paths of blobs on this page.
    pub paths: Vec<String>,
    /// Cursor for the next page, `None` when exhausted.
    pub next_page: Option<String>,
}

/// What a commit action does with its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitActionKind {
    Create(String),
    Delete,
}

/// A single file change inside a multi-file commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAction {
    pub path: String,
    pub kind: CommitActionKind,
}

impl CommitAction {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: CommitActionKind::Create(content.into()),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: CommitActionKind::Delete,
        }
    }

    pub const fn is_delete(&self) -> bool {
        matches!(self.kind, CommitActionKind::Delete)
    }
}

/// A project access token as listed (or just created) on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    pub uid: u64,
    pub name: String,
    pub active: bool,
    pub revoked: bool,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Secret value. Only present in the response that created the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Parameters for minting a new access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessToken {
    pub name: String,
    pub scopes: Vec<String>,
    pub access_level: u32,
    pub expires_at: DateTime<Utc>,
}

/// Identity of the access token selected or minted for a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenGrant {
    pub uid: u64,
    pub expires_at: DateTime<Utc>,
    /// Secret of a freshly minted token; `None` when an existing token was
    /// selected.
    pub token: Option<String>,
}
