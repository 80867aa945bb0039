//! Re-stage exactly one group's files.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::GitError;
use crate::git::changes::ChangeSet;
use crate::git::cli::GitCli;

/// How a requested path ends up in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StageAction {
    /// Stage the new path and the removal of the old one.
    Rename { old_path: String },
    /// Path exists in the working tree.
    Add,
    /// Path is gone from the working tree but known to the index.
    Delete,
    /// Neither on disk nor tracked.
    Missing,
}

/// Resets the index and stages one group at a time.
pub struct StagingEngine<'a> {
    git: &'a GitCli,
    renames: HashMap<String, String>,
}

impl<'a> StagingEngine<'a> {
    pub fn new(git: &'a GitCli, changes: &ChangeSet) -> Self {
        Self {
            git,
            renames: changes.renames(),
        }
    }

    /// Make the index contain exactly `files` on top of HEAD.
    ///
    /// Returns `false` when nothing ended up staged, so the caller can skip
    /// the group instead of creating an empty commit.
    pub fn stage_only(&self, files: &[String]) -> Result<bool, GitError> {
        self.git.reset_index()?;

        for path in files {
            match self.action_for(path)? {
                StageAction::Rename { old_path } => {
                    debug!(%path, %old_path, "Staging rename");
                    if self.git.is_tracked(&old_path)? || self.exists(&old_path) {
                        self.git.add(&[path, &old_path])?;
                    } else {
                        self.git.add(&[path])?;
                    }
                }
                StageAction::Add => {
                    debug!(%path, "Staging path");
                    self.git.add(&[path])?;
                }
                StageAction::Delete => {
                    debug!(%path, "Staging deletion");
                    self.git.remove_cached(path)?;
                }
                StageAction::Missing => {
                    warn!("Skipping {path}: not in the working tree or the index");
                }
            }
        }

        let staged = self.git.has_staged_changes()?;
        if !staged {
            warn!("Nothing staged for {} requested path(s)", files.len());
        }
        Ok(staged)
    }

    fn action_for(&self, path: &str) -> Result<StageAction, GitError> {
        let exists = self.exists(path);
        if exists && let Some(old_path) = self.renames.get(path) {
            return Ok(StageAction::Rename {
                old_path: old_path.clone(),
            });
        }
        if exists {
            return Ok(StageAction::Add);
        }
        if self.git.is_tracked(path)? {
            return Ok(StageAction::Delete);
        }
        Ok(StageAction::Missing)
    }

    fn exists(&self, path: &str) -> bool {
        // symlink_metadata so dangling symlinks still count as present.
        self.git.workdir().join(path).symlink_metadata().is_ok()
    }
}
