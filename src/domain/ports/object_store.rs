//! Object store port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Resource;

/// Persistence for reconciled resources.
///
/// Implementations enforce optimistic concurrency on
/// `metadata.resource_version` and report a stale write as
/// [`DomainError::Conflict`](crate::domain::errors::DomainError::Conflict).
#[async_trait]
pub trait ObjectStore<T: Resource>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> DomainResult<Option<T>>;

    /// Persist metadata and spec. Status is left as stored.
    async fn update(&self, object: &T) -> DomainResult<T>;

    /// Persist the status sub-resource only.
    async fn update_status(&self, object: &T) -> DomainResult<T>;
}
