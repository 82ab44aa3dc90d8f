pub mod access_token;
pub mod ci_variables;
pub mod deletion_lifecycle;
pub mod file_sync;
pub mod key_diff;
pub mod pipeline;
pub mod provider_registry;
pub mod reconciler;
pub mod remote_provider;
pub mod repo_convergence;

pub use deletion_lifecycle::{
    AddDeletionProtection, CheckIfDeleted, HandleDeletion, HandleFinalizer, UpdateObject,
    DELETION_PROTECTION_ANNOTATION,
};
pub use key_diff::{compare_keys, name_difference, DeployKeyDelta};
pub use pipeline::{ConvergenceContext, Flow, PipelineError, PipelineExecutor, ReconcileOutcome, Step};
pub use provider_registry::ProviderRegistry;
pub use reconciler::Reconciler;
pub use remote_provider::RemoteProvider;
pub use repo_convergence::RepoConvergence;
