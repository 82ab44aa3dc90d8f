//! Domain errors for the repokeeper convergence engine.

use thiserror::Error;

/// Format a batch of per-item failures as `a; b; c`.
fn format_failures(errors: &[String]) -> String {
    errors.join("; ")
}

/// Domain-level errors that can occur while converging a repository.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The addressed entity does not exist. Callers decide whether absence
    /// is acceptable.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency conflict reported by the object store.
    #[error("Concurrency conflict: {kind} {name} was modified")]
    Conflict { kind: String, name: String },

    /// Invalid or incomplete configuration (missing secret fields, empty
    /// tenant reference, unknown provider type).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A remote provider call failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Several items of a batch failed. Items that succeeded stay applied.
    #[error("{}: {} of {} failed: {}", .context, .errors.len(), .total, format_failures(.errors))]
    Aggregate {
        context: String,
        total: usize,
        errors: Vec<String>,
    },

    /// Deletion is blocked: the finalizer is missing or the object is
    /// protected against deletion.
    #[error("finalizer was not removed")]
    FinalizerNotRemoved,

    /// Persisting the `failed` status phase failed after an earlier error.
    #[error("failed to persist failed status ({persist}) after error: {original}")]
    StatusPersist {
        original: Box<DomainError>,
        persist: Box<DomainError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    /// Whether this error signals absence of the addressed entity.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error is an optimistic-concurrency conflict.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Build an aggregate error from collected per-item failures, or `Ok`
    /// when nothing failed.
    pub fn aggregate(context: impl Into<String>, total: usize, errors: Vec<String>) -> DomainResult<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self::Aggregate {
                context: context.into(),
                total,
                errors,
            })
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for DomainError {
    fn from(err: serde_yaml::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_ok() {
        assert!(DomainError::aggregate("deploy keys", 3, Vec::new()).is_ok());
    }

    #[test]
    fn test_aggregate_message_lists_failures() {
        let err = DomainError::aggregate(
            "deploy keys",
            3,
            vec!["k1: boom".to_string(), "k2: bang".to_string()],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "deploy keys: 2 of 3 failed: k1: boom; k2: bang");
    }

    #[test]
    fn test_status_persist_wraps_original() {
        let err = DomainError::StatusPersist {
            original: Box::new(DomainError::Provider("create failed".into())),
            persist: Box::new(DomainError::Conflict {
                kind: "Tenant".into(),
                name: "acme".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("create failed"), "got: {msg}");
        assert!(msg.contains("acme"), "got: {msg}");
    }

    #[test]
    fn test_classifiers() {
        assert!(DomainError::NotFound("x".into()).is_not_found());
        assert!(!DomainError::Provider("x".into()).is_not_found());
        assert!(DomainError::Conflict {
            kind: "Cluster".into(),
            name: "c".into()
        }
        .is_conflict());
    }
}
