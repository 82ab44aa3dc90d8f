//! Adapters implementing the domain ports.
//!
//! - `gitlab`: GitLab REST v4 backend
//! - `memory`: in-memory backends for every port

pub mod gitlab;
pub mod memory;
