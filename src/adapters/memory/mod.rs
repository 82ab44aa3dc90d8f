//! In-memory adapters.
//!
//! Back every port without external services. Used by the test suite and
//! by the CLI for the object side of a one-shot reconcile.

pub mod object_store;
pub mod remote;
pub mod secrets;

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::ConnectionSecret;
use crate::domain::ports::{Clock, GitProvider, ProviderFactory, SystemClock};
use crate::services::RemoteProvider;

pub use object_store::InMemoryObjectStore;
pub use remote::InMemoryRemote;
pub use secrets::{InMemorySecretSource, InMemoryTokenVault, StoredToken};

/// Endpoint scheme served by [`MemoryProviderFactory`].
pub const MEMORY_SCHEME: &str = "memory://";

/// Factory handing out providers over one shared [`InMemoryRemote`].
#[derive(Clone)]
pub struct MemoryProviderFactory {
    remote: InMemoryRemote,
    clock: Arc<dyn Clock>,
}

impl MemoryProviderFactory {
    pub fn new(remote: InMemoryRemote) -> Self {
        Self {
            remote,
            clock: Arc::new(SystemClock),
        }
    }
}

impl ProviderFactory for MemoryProviderFactory {
    fn provider_type(&self) -> &str {
        "memory"
    }

    fn matches(&self, endpoint: &str) -> bool {
        endpoint.starts_with(MEMORY_SCHEME)
    }

    fn connect(&self, _secret: &ConnectionSecret) -> DomainResult<Arc<dyn GitProvider>> {
        Ok(Arc::new(RemoteProvider::new(
            self.remote.clone(),
            Arc::clone(&self.clock),
        )))
    }
}
