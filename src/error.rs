//! Error types for gitgroup modules using thiserror.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from git subprocess and libgit2 operations.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Failed to run git {operation}: {source}")]
    SpawnFailed {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {operation} failed: {stderr}")]
    CommandFailed { operation: String, stderr: String },

    #[error("Failed to write commit message file: {0}")]
    MessageFile(#[source] std::io::Error),
}

/// Errors from change collection, staging and committing.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("No changes to commit (working tree is clean)")]
    NoChanges,

    #[error("Failed to collect diff: {0}")]
    DiffFailed(#[source] git2::Error),

    #[error("Failed to stage changes: {0}")]
    StagingFailed(#[source] GitError),

    #[error("Failed to create commit: {0}")]
    CommitFailed(#[source] GitError),
}

/// Error categories reported by the completion service's error envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceErrorKind {
    Authentication,
    Permission,
    RateLimit,
    Overloaded,
    InvalidRequest,
    NotFound,
    Api,
    Other(String),
}

impl ServiceErrorKind {
    /// Classify the `type` field of an error envelope.
    pub fn from_type(raw: &str) -> Self {
        match raw.trim() {
            "authentication_error" => Self::Authentication,
            "permission_error" => Self::Permission,
            "rate_limit_error" => Self::RateLimit,
            "overloaded_error" => Self::Overloaded,
            "invalid_request_error" => Self::InvalidRequest,
            "not_found_error" => Self::NotFound,
            "api_error" => Self::Api,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Authentication => "authentication_error",
            Self::Permission => "permission_error",
            Self::RateLimit => "rate_limit_error",
            Self::Overloaded => "overloaded_error",
            Self::InvalidRequest => "invalid_request_error",
            Self::NotFound => "not_found_error",
            Self::Api => "api_error",
            Self::Other(raw) => raw,
        }
    }

    /// Operator-facing advice for this category.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your credentials: ANTHROPIC_API_KEY is missing, invalid or revoked.",
            Self::Permission => "Check that your API key has access to the requested model.",
            Self::RateLimit => "Rate limited by the completion service. Wait a moment and retry.",
            Self::Overloaded => "The completion service is overloaded. Retry later.",
            Self::InvalidRequest => "The request was rejected. Try a smaller change set or a different model.",
            Self::NotFound => "The model or endpoint was not found. Check --model and GITGROUP_API_URL.",
            Self::Api => "The completion service had an internal error. Retry later.",
            Self::Other(_) => "Unexpected completion service error. Retry later.",
        }
    }

    /// Whether later calls in the same run are pointless after this error.
    pub fn is_persistent(&self) -> bool {
        matches!(
            self,
            Self::Authentication | Self::Permission | Self::NotFound | Self::InvalidRequest
        )
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the completion service client.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Completion service API key not found. Set the ANTHROPIC_API_KEY environment variable")]
    MissingApiKey,

    #[error("Completion service unavailable: {0}")]
    Transport(String),

    #[error("Completion service returned {kind}: {message}")]
    Service {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("Could not extract text from completion response: {0}")]
    Extraction(String),
}

impl CompletionError {
    /// Transport and extraction failures both mean "AI unavailable" to callers.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CompletionError::Transport(_) | CompletionError::Extraction(_) | CompletionError::MissingApiKey
        )
    }

    /// Whether composition should stop asking the service for the rest of the run.
    pub fn disables_service(&self) -> bool {
        match self {
            CompletionError::Service { kind, .. } => kind.is_persistent(),
            other => other.is_unavailable(),
        }
    }

    /// Short operator-facing hint for this failure.
    pub fn guidance(&self) -> &'static str {
        match self {
            CompletionError::MissingApiKey => "Export ANTHROPIC_API_KEY before running gitgroup.",
            CompletionError::Transport(_) => "Check your network connection or GITGROUP_API_URL.",
            CompletionError::Service { kind, .. } => kind.guidance(),
            CompletionError::Extraction(_) => "The service answered in an unexpected shape. Retry, or try another model.",
        }
    }
}

/// Errors from parsing a grouping response.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Response does not begin with a 'GROUP 1:' header")]
    MissingGroupMarker { excerpt: String },

    #[error("Group headers are out of sequence: expected GROUP {expected}, found GROUP {found}")]
    OutOfSequence { expected: usize, found: usize },

    #[error("Group {index} has unrecognised commit type '{raw}'")]
    UnknownType { index: usize, raw: String },
}

impl ParseError {
    /// First part of the offending response, when the error carries one.
    pub fn excerpt(&self) -> Option<&str> {
        match self {
            ParseError::MissingGroupMarker { excerpt } => Some(excerpt),
            _ => None,
        }
    }
}

/// Errors raised before any index mutation.
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("git not found on PATH. Install git and try again")]
    GitNotInstalled,

    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Bare repositories have no working tree to commit from")]
    BareRepository,

    #[error("A {0} is in progress. Finish or abort it before grouping commits")]
    OperationInProgress(String),
}

/// Top-level errors of the grouped-commit workflow.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("Grouped mode requires the completion service: {0}")]
    Completion(#[source] CompletionError),

    #[error("Could not parse grouping response: {0}")]
    Parse(#[from] ParseError),

    #[error("No group in the response listed any committable files")]
    NoUsableGroups,

    #[error("Grouping declined by operator")]
    GroupingDeclined,

    #[error("Prompt failed: {0}")]
    Prompt(String),
}
