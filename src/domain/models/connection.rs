//! Provider connection secret.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::errors::{DomainError, DomainResult};

/// Secret key holding the provider base URL.
pub const ENDPOINT_KEY: &str = "endpoint";
/// Secret key holding the provider API credential.
pub const TOKEN_KEY: &str = "token";
/// Optional secret key holding SSH host keys for the provider.
pub const HOST_KEYS_KEY: &str = "hostKeys";

/// Credentials and endpoint for one provider, read from a namespaced secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSecret {
    pub endpoint: String,
    pub token: String,
    pub host_keys: Option<String>,
}

impl fmt::Debug for ConnectionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSecret")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("host_keys", &self.host_keys.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl ConnectionSecret {
    /// Parse secret data. `endpoint` and `token` are required and must be
    /// non-empty.
    pub fn from_data(name: &str, data: &BTreeMap<String, String>) -> DomainResult<Self> {
        let required = |key: &str| -> DomainResult<String> {
            data.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    DomainError::Configuration(format!(
                        "connection secret '{name}' is missing required field '{key}'"
                    ))
                })
        };

        Ok(Self {
            endpoint: required(ENDPOINT_KEY)?.trim_end_matches('/').to_string(),
            token: required(TOKEN_KEY)?,
            host_keys: data
                .get(HOST_KEYS_KEY)
                .filter(|v| !v.trim().is_empty())
                .cloned(),
        })
    }
}
