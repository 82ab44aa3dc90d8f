//! Secret lookup port.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Read access to namespaced secrets.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Decoded secret data, `None` when the secret does not exist.
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> DomainResult<Option<BTreeMap<String, String>>>;
}
