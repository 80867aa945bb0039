//! gitgroup - A CLI tool that splits uncommitted changes into atomic conventional commits.
//!
//! # Overview
//!
//! gitgroup collects every pending change in a git working tree, asks an AI
//! completion service to partition the changes into logically atomic groups,
//! and walks the operator through staging, reviewing and committing each group
//! in turn. Whatever was staged before the run is restored afterwards.

pub mod commit;
pub mod config;
pub mod error;
pub mod git;
pub mod llm;
pub mod workflow;

// Re-export commonly used types
pub use commit::{CommitMessage, CommitType, Group, GroupParser};
pub use config::Config;
pub use error::{CommitError, CompletionError, GitError, ParseError, PreflightError, WorkflowError};
pub use git::ChangeSet;
pub use llm::{AnthropicClient, CompletionService};
pub use workflow::{GroupedCommit, WorkflowReport};
