//! In-memory object store with resource-version concurrency.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Resource;
use crate::domain::ports::ObjectStore;

#[derive(Debug)]
struct StoreState<T> {
    objects: BTreeMap<String, T>,
    writes: usize,
}

/// Object store that behaves like an API server for one resource kind.
///
/// Every write must carry the current `resource_version` and bumps it.
/// An object with a deletion timestamp and no finalizers is dropped.
#[derive(Debug)]
pub struct InMemoryObjectStore<T> {
    state: RwLock<StoreState<T>>,
}

impl<T: Resource> Default for InMemoryObjectStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> InMemoryObjectStore<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                objects: BTreeMap::new(),
                writes: 0,
            }),
        }
    }

    fn key(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }

    /// Store `object` as a fresh version, replacing anything stored under
    /// its key. Returns the stored copy.
    pub async fn insert(&self, mut object: T) -> T {
        let mut state = self.state.write().await;
        let version = state
            .objects
            .get(&object.key())
            .map_or(0, |existing| existing.metadata().resource_version);
        object.metadata_mut().resource_version = version + 1;
        state.objects.insert(object.key(), object.clone());
        object
    }

    /// Mark the object for deletion. It disappears right away when it
    /// carries no finalizers.
    pub async fn request_deletion(&self, namespace: &str, name: &str) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let key = Self::key(namespace, name);
        let object = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| DomainError::NotFound(key.clone()))?;

        let meta = object.metadata_mut();
        if meta.deletion_timestamp.is_none() {
            meta.deletion_timestamp = Some(Utc::now());
            meta.resource_version += 1;
        }
        if meta.finalizers.is_empty() {
            state.objects.remove(&key);
        }
        Ok(())
    }

    /// Number of `update` and `update_status` calls that succeeded.
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes
    }

    pub async fn contains(&self, namespace: &str, name: &str) -> bool {
        self.state
            .read()
            .await
            .objects
            .contains_key(&Self::key(namespace, name))
    }

    fn check_version<'a>(objects: &'a mut BTreeMap<String, T>, object: &T) -> DomainResult<&'a mut T> {
        let key = object.key();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| DomainError::NotFound(format!("{} {key}", object.kind())))?;
        if stored.metadata().resource_version != object.metadata().resource_version {
            return Err(DomainError::Conflict {
                kind: object.kind().to_string(),
                name: key,
            });
        }
        Ok(stored)
    }
}

#[async_trait]
impl<T: Resource> ObjectStore<T> for InMemoryObjectStore<T> {
    async fn get(&self, namespace: &str, name: &str) -> DomainResult<Option<T>> {
        Ok(self
            .state
            .read()
            .await
            .objects
            .get(&Self::key(namespace, name))
            .cloned())
    }

    async fn update(&self, object: &T) -> DomainResult<T> {
        let mut state = self.state.write().await;
        let stored = Self::check_version(&mut state.objects, object)?;

        let mut next = object.clone();
        *next.status_mut() = stored.status().clone();
        let meta = next.metadata_mut();
        meta.resource_version += 1;
        // Deletion timestamps are set by the store, never by writers.
        meta.deletion_timestamp = stored.metadata().deletion_timestamp;
        let released = meta.deletion_timestamp.is_some() && meta.finalizers.is_empty();

        *stored = next.clone();
        state.writes += 1;
        if released {
            state.objects.remove(&object.key());
        }
        Ok(next)
    }

    async fn update_status(&self, object: &T) -> DomainResult<T> {
        let mut state = self.state.write().await;
        let stored = Self::check_version(&mut state.objects, object)?;

        *stored.status_mut() = object.status().clone();
        stored.metadata_mut().resource_version += 1;
        let next = stored.clone();
        state.writes += 1;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Phase, Tenant, TenantSpec};

    fn tenant() -> Tenant {
        Tenant::new("ns", "acme", TenantSpec::default())
    }

    #[tokio::test]
    async fn test_update_keeps_stored_status() {
        let store = InMemoryObjectStore::new();
        let mut obj = store.insert(tenant()).await;
        obj.status.phase = Phase::Failed;
        obj.metadata.labels.insert("a".into(), "b".into());

        let stored = store.update(&obj).await.unwrap();
        assert_eq!(stored.metadata.resource_version, 2);
        assert_eq!(stored.status.phase, Phase::Pending);
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let store = InMemoryObjectStore::new();
        let obj = store.insert(tenant()).await;
        store.update_status(&obj).await.unwrap();

        let err = store.update(&obj).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_released_object_is_dropped() {
        let store = InMemoryObjectStore::new();
        let mut obj = tenant();
        obj.metadata.add_finalizer("f");
        let obj = store.insert(obj).await;
        store.request_deletion("ns", "acme").await.unwrap();
        assert!(store.contains("ns", "acme").await);

        let mut current = store.get("ns", "acme").await.unwrap().unwrap();
        assert_eq!(current.metadata.resource_version, obj.metadata.resource_version + 1);
        current.metadata.remove_finalizer("f");
        store.update(&current).await.unwrap();
        assert!(!store.contains("ns", "acme").await);
    }
}
