//! CI/CD variable reconciliation over a managed subset.
//!
//! Only names in the managed set are ever referenced. Variables created by
//! people or other tools coexist untouched.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::CiVariable;
use crate::domain::ports::RemoteApi;

use super::key_diff::name_difference;

/// Counts of the operations a reconcile applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CiVariableReport {
    pub deleted: usize,
    pub updated: usize,
    pub created: usize,
}

/// Reconcile CI variables of `full_path`.
///
/// - managed names missing from `desired` are deleted (already-absent is fine);
/// - desired variables inside the managed set are updated, or created when
///   the update reports they do not exist;
/// - desired variables outside the managed set are skipped.
///
/// Every item is attempted; failures are collected into one aggregate error.
pub async fn reconcile_ci_variables(
    api: &dyn RemoteApi,
    full_path: &str,
    managed: &[String],
    desired: &[CiVariable],
) -> DomainResult<CiVariableReport> {
    let desired_names: Vec<String> = desired.iter().map(|v| v.key.clone()).collect();
    let managed_set: BTreeSet<&str> = managed.iter().map(String::as_str).collect();

    let mut report = CiVariableReport::default();
    let mut errors = Vec::new();

    let to_delete = name_difference(managed, &desired_names);
    for name in &to_delete {
        match api.delete_ci_variable(full_path, name).await {
            Ok(()) => {
                info!(repo = full_path, variable = name, "Deleted CI variable");
                report.deleted += 1;
            }
            Err(err) if err.is_not_found() => {
                debug!(repo = full_path, variable = name, "CI variable already absent");
            }
            Err(err) => {
                warn!(repo = full_path, variable = name, error = %err, "Failed to delete CI variable");
                errors.push(format!("delete {name}: {err}"));
            }
        }
    }

    let mut attempted = to_delete.len();
    for variable in desired {
        if !managed_set.contains(variable.key.as_str()) {
            debug!(repo = full_path, variable = %variable.key, "Skipping unmanaged CI variable");
            continue;
        }
        attempted += 1;

        match api.update_ci_variable(full_path, variable).await {
            Ok(()) => report.updated += 1,
            Err(err) if err.is_not_found() => match api.create_ci_variable(full_path, variable).await {
                Ok(()) => {
                    info!(repo = full_path, variable = %variable.key, "Created CI variable");
                    report.created += 1;
                }
                Err(err) => errors.push(format!("create {}: {err}", variable.key)),
            },
            Err(err) => errors.push(format!("update {}: {err}", variable.key)),
        }
    }

    DomainError::aggregate("CI variables", attempted, errors)?;
    Ok(report)
}
