//! GitLab REST v4 wire types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::{
    AccessTokenRecord, CiVariable, CommitAction, CommitActionKind, RemoteDeployKey,
    RemoteRepository,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub ssh_url_to_repo: String,
    #[serde(default)]
    pub archived: bool,
}

impl From<Project> for RemoteRepository {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            full_path: p.path_with_namespace,
            description: p.description.unwrap_or_default(),
            default_branch: p.default_branch,
            web_url: p.web_url,
            ssh_url: p.ssh_url_to_repo,
            archived: p.archived,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Namespace {
    pub id: u64,
    pub full_path: String,
}

#[derive(Debug, Serialize)]
pub struct CreateProject<'a> {
    pub name: &'a str,
    pub path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_id: Option<u64>,
    pub description: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployKey {
    pub id: u64,
    pub title: String,
    pub key: String,
    #[serde(default)]
    pub can_push: bool,
}

impl From<DeployKey> for RemoteDeployKey {
    fn from(k: DeployKey) -> Self {
        Self {
            id: k.id,
            title: k.title,
            key: k.key,
            can_push: k.can_push,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateDeployKey<'a> {
    pub title: &'a str,
    pub key: &'a str,
    pub can_push: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.entry_type == "blob"
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CommitActionBody<'a> {
    pub action: &'static str,
    pub file_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<&'a str>,
}

impl<'a> From<&'a CommitAction> for CommitActionBody<'a> {
    fn from(action: &'a CommitAction) -> Self {
        match &action.kind {
            CommitActionKind::Create(content) => Self {
                action: "create",
                file_path: &action.path,
                content: Some(content),
            },
            CommitActionKind::Delete => Self {
                action: "delete",
                file_path: &action.path,
                content: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateCommit<'a> {
    pub branch: &'a str,
    pub commit_message: &'a str,
    pub actions: Vec<CommitActionBody<'a>>,
}

#[derive(Debug, Serialize)]
pub struct VariableBody<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub masked: bool,
    pub protected: bool,
}

impl<'a> From<&'a CiVariable> for VariableBody<'a> {
    fn from(v: &'a CiVariable) -> Self {
        Self {
            key: &v.key,
            value: &v.value,
            masked: v.masked,
            protected: v.protected,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub revoked: bool,
    /// GitLab reports expiry as a calendar date.
    #[serde(default)]
    pub expires_at: Option<NaiveDate>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl From<AccessToken> for AccessTokenRecord {
    fn from(t: AccessToken) -> Self {
        // A token without expiry never needs rotating.
        let expires_at = t
            .expires_at
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or(DateTime::<Utc>::MAX_UTC, |dt| dt.and_utc());
        Self {
            uid: t.id,
            name: t.name,
            active: t.active,
            revoked: t.revoked,
            expires_at,
            scopes: t.scopes,
            token: t.token,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateAccessToken<'a> {
    pub name: &'a str,
    pub scopes: &'a [String],
    pub access_level: u32,
    /// `YYYY-MM-DD`.
    pub expires_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_date_expiry() {
        let token: AccessToken = serde_json::from_str(
            r#"{"id":7,"name":"flux","active":true,"revoked":false,"expires_at":"2026-04-01","scopes":["read_repository"]}"#,
        )
        .unwrap();
        let record = AccessTokenRecord::from(token);
        assert_eq!(record.expires_at.to_rfc3339(), "2026-04-01T00:00:00+00:00");
        assert!(record.token.is_none());
    }

    #[test]
    fn test_commit_action_body() {
        let delete = CommitAction::delete("old.yml");
        let body = CommitActionBody::from(&delete);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"action": "delete", "file_path": "old.yml"})
        );
    }
}
