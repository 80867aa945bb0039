//! Run configuration, built once at startup and passed to every component.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default completion endpoint (Anthropic Messages API).
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Default token budget per completion request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

const API_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";
const MODEL_ENV_VAR: &str = "GITGROUP_MODEL";
const API_URL_ENV_VAR: &str = "GITGROUP_API_URL";
const TIMEOUT_ENV_VAR: &str = "GITGROUP_TIMEOUT";

/// What to do with a commit type the grouping response does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypePolicy {
    /// Log a warning and use `chore`.
    #[default]
    FallbackToChore,
    /// Fail the parse.
    Reject,
}

/// Settings for the completion service client.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl CompletionSettings {
    /// Read settings from the environment, with CLI overrides taking precedence.
    pub fn from_env(model: Option<String>, max_tokens: Option<u32>) -> Self {
        let api_key = env::var(API_KEY_ENV_VAR).ok().filter(|k| !k.trim().is_empty());
        let model = model
            .or_else(|| env::var(MODEL_ENV_VAR).ok().filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url = env::var(API_URL_ENV_VAR)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Self {
            api_url,
            api_key,
            model,
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: get_timeout(),
        }
    }
}

/// Get the configured request timeout.
///
/// Reads GITGROUP_TIMEOUT if set, otherwise uses 120 seconds. Invalid values
/// are logged and ignored.
fn get_timeout() -> Duration {
    match env::var(TIMEOUT_ENV_VAR) {
        Ok(v) if !v.is_empty() => match v.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(
                    "Invalid {} value '{}', using default {}s",
                    TIMEOUT_ENV_VAR, v, DEFAULT_TIMEOUT_SECS
                );
                Duration::from_secs(DEFAULT_TIMEOUT_SECS)
            }
        },
        _ => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    }
}

/// Immutable configuration for one grouped-commit run.
#[derive(Debug, Clone)]
pub struct Config {
    pub repo_path: PathBuf,
    pub dry_run: bool,
    /// Ask the completion service for commit messages (grouping always uses it).
    pub ai_messages: bool,
    pub emoji: bool,
    /// Trailer lines appended to every commit, e.g. `Co-authored-by: A <a@b.c>`.
    pub trailers: Vec<String>,
    pub type_policy: TypePolicy,
    /// Skip the group-count confirmation.
    pub auto_confirm: bool,
    pub completion: CompletionSettings,
}

impl Config {
    /// Defaults for a repository at `repo_path`; used by tests and as a base for the CLI.
    pub fn for_repo(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            dry_run: false,
            ai_messages: true,
            emoji: false,
            trailers: Vec::new(),
            type_policy: TypePolicy::default(),
            auto_confirm: false,
            completion: CompletionSettings {
                api_url: DEFAULT_API_URL.to_string(),
                api_key: None,
                model: DEFAULT_MODEL.to_string(),
                max_tokens: DEFAULT_MAX_TOKENS,
                timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            },
        }
    }
}

/// Turn a `--co-author` value into a trailer line.
///
/// Accepts either `Name <email>` or an already formed `Co-authored-by:` line.
pub fn co_author_trailer(value: &str) -> String {
    let value = value.trim();
    if value.to_lowercase().starts_with("co-authored-by:") {
        value.to_string()
    } else {
        format!("Co-authored-by: {value}")
    }
}
