//! Capture of the pre-workflow index and its best-effort reapplication.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::GitError;
use crate::git::cli::GitCli;

/// The index as it was before grouping began, as a binary patch against HEAD.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    patch: String,
}

/// What happened when a snapshot was reapplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing was staged before the workflow started.
    Empty,
    /// The patch was applied on top of the current index.
    Applied,
    /// The index already contains the patch (for example, a group committed it).
    AlreadyPresent,
    /// The patch no longer applies; the message explains why.
    Failed(String),
}

impl fmt::Display for RestoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreOutcome::Empty => write!(f, "nothing was staged before the run"),
            RestoreOutcome::Applied => write!(f, "original staged changes reapplied"),
            RestoreOutcome::AlreadyPresent => write!(f, "original staged changes already present"),
            RestoreOutcome::Failed(msg) => write!(f, "could not reapply original staged changes: {msg}"),
        }
    }
}

impl IndexSnapshot {
    pub fn capture(git: &GitCli) -> Result<Self, GitError> {
        let patch = git.staged_patch()?;
        debug!(bytes = patch.len(), "Captured index snapshot");
        Ok(Self { patch })
    }

    pub fn is_empty(&self) -> bool {
        self.patch.trim().is_empty()
    }

    /// Reapply the snapshot to the index. Never fails; problems are reported
    /// through the returned outcome.
    pub fn restore(&self, git: &GitCli) -> RestoreOutcome {
        if self.is_empty() {
            return RestoreOutcome::Empty;
        }

        match git.apply_cached_check(&self.patch, false) {
            Ok(true) => match git.apply_cached(&self.patch) {
                Ok(()) => {
                    info!("Reapplied original staged changes");
                    RestoreOutcome::Applied
                }
                Err(e) => {
                    warn!("Failed to reapply original staged changes: {e}");
                    RestoreOutcome::Failed(e.to_string())
                }
            },
            Ok(false) => match git.apply_cached_check(&self.patch, true) {
                Ok(true) => RestoreOutcome::AlreadyPresent,
                Ok(false) => {
                    let msg = "patch conflicts with the current index".to_string();
                    warn!("Failed to reapply original staged changes: {msg}");
                    RestoreOutcome::Failed(msg)
                }
                Err(e) => RestoreOutcome::Failed(e.to_string()),
            },
            Err(e) => {
                warn!("Failed to check original staged changes: {e}");
                RestoreOutcome::Failed(e.to_string())
            }
        }
    }
}
