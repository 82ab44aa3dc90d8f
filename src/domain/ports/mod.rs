//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces that adapters must implement:
//! - GitProvider / ProviderFactory: high-level provider operations
//! - RemoteApi: raw git-hosting REST operations
//! - ObjectStore: resource persistence with optimistic concurrency
//! - SecretSource: connection-secret lookup
//! - TokenVault: hand-off of minted access tokens
//! - Clock: injectable time source

pub mod clock;
pub mod object_store;
pub mod provider;
pub mod remote_api;
pub mod secret_source;
pub mod token_vault;

pub use clock::{Clock, FixedClock, SystemClock};
pub use object_store::ObjectStore;
pub use provider::{GitProvider, ProviderFactory};
pub use remote_api::RemoteApi;
pub use secret_source::SecretSource;
pub use token_vault::TokenVault;
