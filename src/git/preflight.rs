//! Repository checks that run before anything touches the index.

use std::path::Path;

use git2::{Repository, RepositoryState};
use tracing::debug;

use crate::error::PreflightError;

/// Check that the `git` executable is available on PATH.
pub fn check_git_installed() -> Result<(), PreflightError> {
    match which::which("git") {
        Ok(path) => {
            debug!(path = %path.display(), "Found git");
            Ok(())
        }
        Err(_) => Err(PreflightError::GitNotInstalled),
    }
}

/// Open the repository containing `path`, rejecting bare repositories.
pub fn open_repository(path: &Path) -> Result<Repository, PreflightError> {
    let repo = Repository::discover(path)
        .map_err(|_| PreflightError::NotARepository(path.to_path_buf()))?;

    if repo.is_bare() || repo.workdir().is_none() {
        return Err(PreflightError::BareRepository);
    }

    Ok(repo)
}

/// Name of the conflicting operation in progress, if any.
pub fn operation_in_progress(repo: &Repository) -> Option<&'static str> {
    match repo.state() {
        RepositoryState::Clean => None,
        RepositoryState::Merge => Some("merge"),
        RepositoryState::Revert | RepositoryState::RevertSequence => Some("revert"),
        RepositoryState::CherryPick | RepositoryState::CherryPickSequence => Some("cherry-pick"),
        RepositoryState::Bisect => Some("bisect"),
        RepositoryState::Rebase
        | RepositoryState::RebaseInteractive
        | RepositoryState::RebaseMerge => Some("rebase"),
        RepositoryState::ApplyMailbox | RepositoryState::ApplyMailboxOrRebase => Some("mailbox apply"),
    }
}
