//! GitLab provider.

pub mod api;
pub mod client;
pub mod errors;
pub mod models;

use std::sync::Arc;

use reqwest::Url;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ConnectionSecret, GitLabConfig};
use crate::domain::ports::{Clock, GitProvider, ProviderFactory, SystemClock};
use crate::services::RemoteProvider;

pub use api::PROVIDER_TYPE;
pub use client::GitLabClient;
pub use errors::GitLabError;

/// Connects [`RemoteProvider`]s backed by [`GitLabClient`].
#[derive(Clone)]
pub struct GitLabProviderFactory {
    config: GitLabConfig,
    clock: Arc<dyn Clock>,
}

impl GitLabProviderFactory {
    pub fn new(config: GitLabConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }
}

impl ProviderFactory for GitLabProviderFactory {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE
    }

    /// Any http(s) endpoint with a host. Self-hosted instances rarely carry
    /// `gitlab` in their name, so register this factory after narrower ones.
    fn matches(&self, endpoint: &str) -> bool {
        Url::parse(endpoint).is_ok_and(|url| {
            matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
        })
    }

    fn connect(&self, secret: &ConnectionSecret) -> DomainResult<Arc<dyn GitProvider>> {
        let client = GitLabClient::new(&secret.endpoint, &secret.token, &self.config)?;
        Ok(Arc::new(RemoteProvider::new(client, Arc::clone(&self.clock))))
    }
}
