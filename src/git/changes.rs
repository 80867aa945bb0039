//! Change collection and diff context from the working tree using git2.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use git2::{Diff, DiffFormat, DiffOptions, ErrorCode, Repository, Status, StatusOptions, Tree};
use tracing::{debug, warn};

use crate::error::CommitError;

/// Maximum characters for the unified diff text before truncation.
const MAX_DIFF_LENGTH: usize = 30_000;

/// Status of a changed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "Added"),
            FileStatus::Modified => write!(f, "Modified"),
            FileStatus::Deleted => write!(f, "Deleted"),
            FileStatus::Renamed => write!(f, "Renamed"),
        }
    }
}

/// A file that was changed in the working tree.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub status: FileStatus,
    /// Old path for renamed files (None for non-rename changes).
    pub old_path: Option<String>,
}

/// All committable paths at one point in time.
///
/// Sorted by path, one entry per path; renames appear once under the new path.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub files: Vec<ChangedFile>,
    /// Number of changed paths dropped because they match ignore rules.
    pub ignored: usize,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    /// Every path whose diff belongs to this set, including the old side of renames.
    pub fn diff_paths(&self) -> Vec<String> {
        self.files
            .iter()
            .flat_map(|f| std::iter::once(&f.path).chain(f.old_path.as_ref()))
            .cloned()
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    /// New path → old path for every rename.
    pub fn renames(&self) -> HashMap<String, String> {
        self.files
            .iter()
            .filter_map(|f| f.old_path.as_ref().map(|old| (f.path.clone(), old.clone())))
            .collect()
    }
}

/// Summary of changes in the working tree.
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    pub diff_text: String,
    pub truncated: bool,
    pub additions: usize,
    pub deletions: usize,
}

/// Enumerate every committable path: staged, unstaged and untracked.
///
/// Paths matching the repository's ignore rules are dropped and counted, even
/// when they are tracked. Returns `CommitError::NoChanges` when nothing is left.
pub fn collect_changes(repo: &Repository) -> Result<ChangeSet, CommitError> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .include_unmodified(false)
        .renames_head_to_index(true)
        .renames_index_to_workdir(true);

    let statuses = repo.statuses(Some(&mut opts)).map_err(CommitError::DiffFailed)?;

    let mut files = Vec::new();
    let mut ignored = 0usize;

    for entry in statuses.iter() {
        let status = entry.status();
        if status.is_ignored() || status == Status::CURRENT {
            continue;
        }

        let Some(file) = changed_file_from_status(&entry, status) else {
            continue;
        };

        match repo.status_should_ignore(Path::new(&file.path)) {
            Ok(true) => {
                debug!(path = %file.path, "Excluding ignored path");
                ignored += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => warn!("Could not check ignore rules for {}: {e}", file.path),
        }

        files.push(file);
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);

    if files.is_empty() {
        return Err(CommitError::NoChanges);
    }

    Ok(ChangeSet { files, ignored })
}

/// Map one status entry to a [`ChangedFile`], resolving renames to the new path.
fn changed_file_from_status(entry: &git2::StatusEntry<'_>, status: Status) -> Option<ChangedFile> {
    let rename_delta = if status.is_index_renamed() {
        entry.head_to_index()
    } else if status.is_wt_renamed() {
        entry.index_to_workdir()
    } else {
        None
    };

    if let Some(delta) = rename_delta {
        let new_path = delta.new_file().path().map(|p| p.to_string_lossy().to_string())?;
        let old_path = delta.old_file().path().map(|p| p.to_string_lossy().to_string());
        return Some(ChangedFile {
            path: new_path,
            status: FileStatus::Renamed,
            old_path,
        });
    }

    let path = entry.path()?.to_string();
    let file_status = if status.is_index_new() || status.is_wt_new() {
        FileStatus::Added
    } else if status.is_index_deleted() || status.is_wt_deleted() {
        FileStatus::Deleted
    } else {
        FileStatus::Modified
    };

    Some(ChangedFile {
        path,
        status: file_status,
        old_path: None,
    })
}

/// Resolve the HEAD tree, distinguishing empty-repo errors from real failures.
///
/// Returns `Ok(None)` for repos with no commits (unborn branch / not found),
/// `Ok(Some(tree))` for repos with a valid HEAD, or `Err(CommitError::DiffFailed)`
/// for real errors (corrupt HEAD, permission issues, missing objects).
fn resolve_head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, CommitError> {
    let head_ref = match repo.head() {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok(None);
        }
        Err(e) => return Err(CommitError::DiffFailed(e)),
    };

    let tree = head_ref.peel_to_tree().map_err(CommitError::DiffFailed)?;
    Ok(Some(tree))
}

/// Staged and unstaged diff of `paths`, merged into one prompt-sized summary.
///
/// Paths match literally, so only the given paths contribute. Returns
/// `CommitError::NoChanges` when none of them differ from HEAD.
pub fn collect_diff_for_paths(
    repo: &Repository,
    paths: &[String],
) -> Result<DiffSummary, CommitError> {
    // An empty pathspec would match the whole tree.
    if paths.is_empty() {
        return Err(CommitError::NoChanges);
    }
    let head_tree = resolve_head_tree(repo)?;

    let mut staged_opts = literal_pathspec(paths);
    let staged = repo
        .diff_tree_to_index(head_tree.as_ref(), None, Some(&mut staged_opts))
        .map_err(CommitError::DiffFailed)?;

    let mut unstaged_opts = literal_pathspec(paths);
    unstaged_opts
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .show_untracked_content(true);
    let unstaged = repo
        .diff_index_to_workdir(None, Some(&mut unstaged_opts))
        .map_err(CommitError::DiffFailed)?;

    if staged.deltas().len() + unstaged.deltas().len() == 0 {
        return Err(CommitError::NoChanges);
    }

    let mut summary = DiffSummary::default();
    for diff in [&staged, &unstaged] {
        match summary.append(diff) {
            Ok(()) => {}
            Err(_) if summary.truncated => break,
            Err(e) => {
                warn!("Failed to collect diff text: {e}");
                summary.truncated = true;
                break;
            }
        }
    }
    debug!(
        paths = paths.len(),
        chars = summary.diff_text.len(),
        truncated = summary.truncated,
        "Collected diff context"
    );
    Ok(summary)
}

fn literal_pathspec(paths: &[String]) -> DiffOptions {
    let mut opts = DiffOptions::new();
    opts.disable_pathspec_match(true);
    for path in paths {
        opts.pathspec(path);
    }
    opts
}

impl DiffSummary {
    /// Append one diff's patch text. Stops, marking the summary truncated,
    /// once the text would pass `MAX_DIFF_LENGTH`.
    fn append(&mut self, diff: &Diff<'_>) -> Result<(), git2::Error> {
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            let origin = line.origin();
            let content = String::from_utf8_lossy(line.content());
            if self.diff_text.len() + content.len() + 1 > MAX_DIFF_LENGTH {
                self.truncated = true;
                return false;
            }
            match origin {
                '+' => self.additions += 1,
                '-' => self.deletions += 1,
                _ => {}
            }
            if matches!(origin, '+' | '-' | ' ') {
                self.diff_text.push(origin);
            }
            self.diff_text.push_str(&content);
            true
        })
    }
}
