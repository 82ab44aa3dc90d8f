//! Token vault port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::AccessTokenGrant;

/// Destination for freshly minted access-token secrets.
///
/// A token secret is only visible in the response that created it, so the
/// engine hands it off here exactly once.
#[async_trait]
pub trait TokenVault: Send + Sync {
    async fn store_token(&self, path: &str, grant: &AccessTokenGrant, token: &str)
        -> DomainResult<()>;
}
