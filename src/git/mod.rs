//! Git access: libgit2 for reads, the `git` binary for index mutation and commits.

pub mod changes;
pub mod cli;
pub mod preflight;
pub mod snapshot;
pub mod staging;

pub use changes::{ChangeSet, ChangedFile, DiffSummary, FileStatus, collect_changes, collect_diff_for_paths};
pub use cli::GitCli;
pub use snapshot::{IndexSnapshot, RestoreOutcome};
pub use staging::StagingEngine;
