//! In-memory secret source and token vault.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::AccessTokenGrant;
use crate::domain::ports::{SecretSource, TokenVault};

/// Secrets keyed by `namespace/name`.
#[derive(Debug, Default)]
pub struct InMemorySecretSource {
    secrets: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
}

impl InMemorySecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        self.secrets
            .write()
            .await
            .insert(format!("{namespace}/{name}"), data);
    }

    pub async fn remove(&self, namespace: &str, name: &str) {
        self.secrets.write().await.remove(&format!("{namespace}/{name}"));
    }
}

#[async_trait]
impl SecretSource for InMemorySecretSource {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> DomainResult<Option<BTreeMap<String, String>>> {
        Ok(self
            .secrets
            .read()
            .await
            .get(&format!("{namespace}/{name}"))
            .cloned())
    }
}

/// A token handed to the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub uid: u64,
    pub token: String,
}

/// Vault keeping the latest token per repository path.
#[derive(Debug, Default)]
pub struct InMemoryTokenVault {
    tokens: RwLock<BTreeMap<String, StoredToken>>,
}

impl InMemoryTokenVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<StoredToken> {
        self.tokens.read().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl TokenVault for InMemoryTokenVault {
    async fn store_token(&self, path: &str, grant: &AccessTokenGrant, token: &str) -> DomainResult<()> {
        self.tokens.write().await.insert(
            path.to_string(),
            StoredToken {
                uid: grant.uid,
                token: token.to_string(),
            },
        );
        Ok(())
    }
}
