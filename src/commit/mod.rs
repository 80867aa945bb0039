//! Commit groups, the grouping response parser and commit messages.

pub mod group;
pub mod message;
pub mod parser;

pub use group::{CommitType, Group};
pub use message::{CommitMessage, MessageComposer, ValidationIssue};
pub use parser::{GroupParser, GroupReport, ParsedGroups, reconcile};
