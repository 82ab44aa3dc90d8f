//! Template file synchronisation.
//!
//! Only presence is diffed: a desired file that already exists remotely is
//! left alone even when its content differs. Files marked
//! [`FileOp::Delete`] are removed when present.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{CommitAction, FileOp, RepoDescriptor};
use crate::domain::ports::RemoteApi;

/// Branch used when the remote does not report a default branch.
pub const FALLBACK_BRANCH: &str = "main";

/// Commit message for template synchronisation commits.
pub const COMMIT_MESSAGE: &str = "repokeeper: sync template files";

/// Collect every blob path of the remote tree, following pagination until
/// the cursor is exhausted.
///
/// An empty repository has no tree at all; the provider reports that as
/// `NotFound`, which is treated as "no remote files".
pub async fn fetch_remote_tree(api: &dyn RemoteApi, full_path: &str) -> DomainResult<BTreeSet<String>> {
    let mut paths = BTreeSet::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = match api.list_tree_page(full_path, cursor.as_deref()).await {
            Ok(page) => page,
            Err(err) if err.is_not_found() && cursor.is_none() => {
                debug!(repo = full_path, "Remote tree not found, treating repository as empty");
                return Ok(paths);
            }
            Err(err) => return Err(err),
        };

        paths.extend(page.paths);

        match page.next_page {
            Some(next) if !next.is_empty() => {
                if cursor.as_deref() == Some(next.as_str()) {
                    warn!(repo = full_path, page = %next, "Tree pagination returned the same cursor twice");
                    break;
                }
                cursor = Some(next);
            }
            _ => break,
        }
    }

    Ok(paths)
}

/// Compute commit actions for `desired` against the remote path set.
///
/// | remote has path | desired op | action |
/// |---|---|---|
/// | yes | delete | delete |
/// | no  | write  | create |
/// | yes | write  | none   |
/// | no  | delete | none   |
///
/// Actions come out in path order with at most one per path.
pub fn plan_actions(
    desired: &BTreeMap<String, FileOp>,
    remote: &BTreeSet<String>,
) -> Vec<CommitAction> {
    desired
        .iter()
        .filter_map(|(path, op)| match (remote.contains(path), op) {
            (true, FileOp::Delete) => Some(CommitAction::delete(path)),
            (false, FileOp::Write(content)) => Some(CommitAction::create(path, content)),
            (true, FileOp::Write(_)) | (false, FileOp::Delete) => None,
        })
        .collect()
}

/// Bring the remote file tree in line with the descriptor's template files.
///
/// Returns the number of actions committed; zero means no commit was made.
pub async fn sync_template_files(
    api: &dyn RemoteApi,
    repo: &RepoDescriptor,
    default_branch: Option<&str>,
) -> DomainResult<usize> {
    if repo.template_files.is_empty() {
        return Ok(0);
    }

    let full_path = repo.full_path();
    let remote = fetch_remote_tree(api, &full_path).await?;
    let actions = plan_actions(&repo.template_files, &remote);

    if actions.is_empty() {
        debug!(repo = %full_path, "Template files already in sync");
        return Ok(0);
    }

    let branch = default_branch.unwrap_or(FALLBACK_BRANCH);
    info!(
        repo = %full_path,
        branch = branch,
        creates = actions.iter().filter(|a| !a.is_delete()).count(),
        deletes = actions.iter().filter(|a| a.is_delete()).count(),
        "Committing template files"
    );

    api.create_commit(&full_path, branch, COMMIT_MESSAGE, &actions)
        .await?;
    Ok(actions.len())
}
