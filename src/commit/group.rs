//! Commit groups and the conventional commit types they carry.

use std::fmt;

use tracing::warn;

use crate::config::TypePolicy;

/// Maximum scope length accepted from a grouping response.
pub const MAX_SCOPE_LENGTH: usize = 20;

/// Commit types a group may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitType {
    Feat,
    Fix,
    Docs,
    Test,
    Refactor,
    Chore,
    Ci,
}

impl CommitType {
    pub const ALL: [CommitType; 7] = [
        CommitType::Feat,
        CommitType::Fix,
        CommitType::Docs,
        CommitType::Test,
        CommitType::Refactor,
        CommitType::Chore,
        CommitType::Ci,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitType::Feat => "feat",
            CommitType::Fix => "fix",
            CommitType::Docs => "docs",
            CommitType::Test => "test",
            CommitType::Refactor => "refactor",
            CommitType::Chore => "chore",
            CommitType::Ci => "ci",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            CommitType::Feat => "✨",
            CommitType::Fix => "🐛",
            CommitType::Docs => "📝",
            CommitType::Test => "✅",
            CommitType::Refactor => "♻️",
            CommitType::Chore => "🔧",
            CommitType::Ci => "👷",
        }
    }

    /// Match a type token exactly or through a known alias.
    pub fn recognize(raw: &str) -> Option<Self> {
        let token = raw.trim().to_lowercase();
        let ty = match token.as_str() {
            "feat" | "feature" | "features" => CommitType::Feat,
            "fix" | "bugfix" | "bug" | "hotfix" => CommitType::Fix,
            "docs" | "doc" | "documentation" => CommitType::Docs,
            "test" | "tests" | "testing" => CommitType::Test,
            "refactor" | "refactoring" => CommitType::Refactor,
            "chore" | "chores" | "build" | "deps" | "style" => CommitType::Chore,
            "ci" => CommitType::Ci,
            _ => return None,
        };
        Some(ty)
    }

    /// Normalise a type token under `policy`.
    ///
    /// Returns `None` only under [`TypePolicy::Reject`].
    pub fn normalize(raw: &str, policy: TypePolicy) -> Option<Self> {
        if let Some(ty) = Self::recognize(raw) {
            return Some(ty);
        }
        match policy {
            TypePolicy::FallbackToChore => {
                warn!("Unrecognised commit type '{}', using chore", raw.trim());
                Some(CommitType::Chore)
            }
            TypePolicy::Reject => None,
        }
    }
}

impl fmt::Display for CommitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalise a scope token: `NONE` or empty means absent, invalid tokens are dropped.
pub fn normalize_scope(raw: &str) -> Option<String> {
    let scope = raw.trim().trim_matches(|c| c == '(' || c == ')' || c == '`');
    if scope.is_empty() || scope.eq_ignore_ascii_case("none") {
        return None;
    }

    let valid = scope.len() <= MAX_SCOPE_LENGTH
        && scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        warn!("Ignoring invalid scope '{scope}'");
        return None;
    }
    Some(scope.to_string())
}

/// One proposed atomic commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// 1-based position; groups are committed in ascending order.
    pub index: usize,
    pub commit_type: CommitType,
    pub scope: Option<String>,
    pub description: String,
    pub files: Vec<String>,
}

impl Group {
    /// `type(scope)` or just `type`.
    pub fn label(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}({scope})", self.commit_type),
            None => self.commit_type.to_string(),
        }
    }
}
