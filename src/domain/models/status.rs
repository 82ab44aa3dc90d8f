//! Repository status surface written back to the owning resource.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;

use super::repository::CiVariable;

/// Provisioning phase of the remote repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Not yet reconciled.
    #[default]
    #[serde(rename = "")]
    Pending,
    Creating,
    Created,
    Failed,
}

impl Phase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Failed => "failed",
        }
    }
}

/// Record of the CI variable set applied on the last successful pass.
///
/// Holds names plus a digest of the full variable list so that unchanged
/// desired state issues no provider calls, without keeping variable values
/// in status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastAppliedCiVariables {
    pub names: Vec<String>,
    pub digest: String,
}

impl LastAppliedCiVariables {
    /// Build the record for a desired variable list.
    pub fn from_desired(variables: &[CiVariable]) -> DomainResult<Self> {
        let mut sorted: Vec<&CiVariable> = variables.iter().collect();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));

        let canonical = serde_json::to_vec(&sorted)?;
        let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, &canonical).to_string();

        Ok(Self {
            names: sorted.iter().map(|v| v.key.clone()).collect(),
            digest,
        })
    }
}

/// Status of the remote repository managed for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStatus {
    #[serde(default)]
    pub phase: Phase,
    /// Provider type discovered for the repository.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_keys: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_uid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_ci_variables: Option<LastAppliedCiVariables>,
}
