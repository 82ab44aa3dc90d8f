//! Provider registry.
//!
//! The [`ProviderRegistry`] holds every [`ProviderFactory`] known to the
//! process. It is built once at startup and handed to the convergence step;
//! nothing registers itself.

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AUTO_REPO_TYPE;
use crate::domain::ports::ProviderFactory;

/// Registered provider factories, in registration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: Vec<Arc<dyn ProviderFactory>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("factories", &self.provider_types())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. A later factory with the same type name replaces
    /// the earlier one.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) -> &mut Self {
        self.factories
            .retain(|f| f.provider_type() != factory.provider_type());
        self.factories.push(factory);
        self
    }

    pub fn with(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.register(factory);
        self
    }

    pub fn provider_types(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.provider_type()).collect()
    }

    /// Find the factory for `repo_type`.
    ///
    /// [`AUTO_REPO_TYPE`] picks the first factory whose
    /// [`matches`](ProviderFactory::matches) accepts `endpoint`. Any other
    /// value must name a registered type exactly.
    pub fn resolve(&self, repo_type: &str, endpoint: &str) -> DomainResult<Arc<dyn ProviderFactory>> {
        let found = if repo_type == AUTO_REPO_TYPE {
            self.factories.iter().find(|f| f.matches(endpoint))
        } else {
            self.factories.iter().find(|f| f.provider_type() == repo_type)
        };

        found.cloned().ok_or_else(|| {
            if repo_type == AUTO_REPO_TYPE {
                DomainError::Configuration(format!("no provider matches endpoint {endpoint}"))
            } else {
                DomainError::Configuration(format!(
                    "unknown repository type {repo_type:?} (known: {})",
                    self.provider_types().join(", ")
                ))
            }
        })
    }
}
