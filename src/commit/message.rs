//! Commit message model, validation and composition.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::{debug, warn};

use crate::commit::group::{CommitType, Group};
use crate::error::CompletionError;
use crate::git::changes::DiffSummary;
use crate::llm::client::CompletionService;
use crate::llm::prompt::{MESSAGE_SYSTEM, build_adjust_prompt, build_message_prompt};

/// Maximum summary line length, counted in characters including any prefix.
pub const MAX_SUMMARY_LENGTH: usize = 72;

/// Optional leading emoji token, then `type(scope)!:`.
static CONVENTIONAL_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:[^\sA-Za-z0-9]+\s+)?[A-Za-z]+(?:\([^)]*\))?!?:\s*").ok()
});

/// A commit message split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub summary: String,
    pub body: Option<String>,
    pub trailers: Vec<String>,
}

impl CommitMessage {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            body: None,
            trailers: Vec::new(),
        }
    }

    /// Split raw text into summary (first non-empty line) and body (the rest).
    pub fn from_text(text: &str) -> Self {
        let mut lines = text.trim().lines();
        let summary = lines
            .by_ref()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string();
        let rest = lines.collect::<Vec<_>>().join("\n");
        let body = Some(rest.trim().to_string()).filter(|b| !b.is_empty());
        Self {
            summary,
            body,
            trailers: Vec::new(),
        }
    }

    /// Append trailers, skipping duplicates (case-insensitive) and ones already in the body.
    pub fn with_trailers(mut self, trailers: &[String]) -> Self {
        for trailer in trailers {
            let trailer = trailer.trim();
            if trailer.is_empty() {
                continue;
            }
            let in_body = self
                .body
                .as_ref()
                .is_some_and(|b| b.lines().any(|l| l.trim().eq_ignore_ascii_case(trailer)));
            let duplicate = self
                .trailers
                .iter()
                .any(|t| t.eq_ignore_ascii_case(trailer));
            if !in_body && !duplicate {
                self.trailers.push(trailer.to_string());
            }
        }
        self
    }

    /// Render for `git commit -F`: exactly one blank line before the body and
    /// before the trailer block.
    pub fn format(&self) -> String {
        let mut parts = vec![self.summary.trim().to_string()];

        if let Some(body) = self.body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            parts.push(String::new());
            parts.push(body.to_string());
        }

        if !self.trailers.is_empty() {
            parts.push(String::new());
            parts.push(self.trailers.join("\n"));
        }

        let mut text = parts.join("\n");
        text.push('\n');
        text
    }

    pub fn summary_length(&self) -> usize {
        self.summary.chars().count()
    }

    pub fn validate(&self) -> Vec<ValidationIssue> {
        validate(&self.format())
    }
}

impl fmt::Display for CommitMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format().trim_end())
    }
}

/// Shape problems found by [`validate`]. All are advisory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptySummary,
    SummaryTooLong { length: usize },
    MissingBlankLine,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptySummary => write!(f, "summary line is empty"),
            ValidationIssue::SummaryTooLong { length } => write!(
                f,
                "summary line is {length} characters (limit {MAX_SUMMARY_LENGTH})"
            ),
            ValidationIssue::MissingBlankLine => {
                write!(f, "body must be separated from the summary by a blank line")
            }
        }
    }
}

/// Check a raw message: summary length and the blank line after it.
pub fn validate(text: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut lines = text.lines();

    let summary = lines.next().unwrap_or("").trim_end();
    if summary.trim().is_empty() {
        issues.push(ValidationIssue::EmptySummary);
    }
    let length = summary.chars().count();
    if length > MAX_SUMMARY_LENGTH {
        issues.push(ValidationIssue::SummaryTooLong { length });
    }

    let rest: Vec<&str> = lines.collect();
    let has_body = rest.iter().any(|l| !l.trim().is_empty());
    if has_body && rest.first().is_some_and(|l| !l.trim().is_empty()) {
        issues.push(ValidationIssue::MissingBlankLine);
    }

    issues
}

/// `[emoji ]type[(scope)]:`
pub fn header_prefix(commit_type: CommitType, scope: Option<&str>, emoji: bool) -> String {
    let mut prefix = String::new();
    if emoji {
        prefix.push_str(commit_type.emoji());
        prefix.push(' ');
    }
    prefix.push_str(commit_type.as_str());
    if let Some(scope) = scope {
        prefix.push('(');
        prefix.push_str(scope);
        prefix.push(')');
    }
    prefix.push(':');
    prefix
}

/// Room left for the description after `prefix` and one space.
pub fn max_description_length(prefix: &str) -> usize {
    MAX_SUMMARY_LENGTH.saturating_sub(prefix.chars().count() + 1)
}

/// Strip code fences, surrounding quotes and a leading `Here is...:` line.
pub fn clean_ai_output(text: &str) -> String {
    let mut lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect();

    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }

    if let Some(first) = lines.first() {
        let first = first.trim();
        let is_header = CONVENTIONAL_PREFIX
            .as_ref()
            .is_some_and(|re| re.find(first).is_some_and(|m| m.end() < first.len()));
        if first.ends_with(':') && !is_header {
            debug!(line = first, "Dropping preamble line from AI output");
            lines.remove(0);
        }
    }

    let joined = lines.join("\n");
    let trimmed = joined.trim();
    let unquoted = ['"', '\'', '`']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|s| s.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

/// Replace whatever prefix the summary has with `prefix`.
fn with_prefix(summary: &str, prefix: &str, fallback: &str) -> String {
    let rest = CONVENTIONAL_PREFIX
        .as_ref()
        .and_then(|re| re.find(summary))
        .map_or(summary, |m| &summary[m.end()..])
        .trim();
    let rest = if rest.is_empty() { fallback.trim() } else { rest };
    format!("{prefix} {rest}")
}

/// Where a composed message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    Ai,
    Template,
}

/// Output of [`MessageComposer::compose`].
#[derive(Debug)]
pub struct Composed {
    pub message: CommitMessage,
    pub source: MessageSource,
    /// The completion failure that forced the template, if any.
    pub ai_error: Option<CompletionError>,
}

/// Builds commit messages for groups, from the completion service or a template.
pub struct MessageComposer<'a> {
    service: Option<&'a dyn CompletionService>,
    emoji: bool,
    trailers: Vec<String>,
}

impl<'a> MessageComposer<'a> {
    pub fn new(service: Option<&'a dyn CompletionService>, emoji: bool, trailers: Vec<String>) -> Self {
        Self {
            service,
            emoji,
            trailers,
        }
    }

    pub fn has_service(&self) -> bool {
        self.service.is_some()
    }

    pub fn prefix(&self, group: &Group) -> String {
        header_prefix(group.commit_type, group.scope.as_deref(), self.emoji)
    }

    /// Compose a message for `group`, asking the service when `ai_available`.
    pub async fn compose(&self, group: &Group, diff: &DiffSummary, ai_available: bool) -> Composed {
        let service = self.service.filter(|_| ai_available);
        let Some(service) = service else {
            return Composed {
                message: self.template(group),
                source: MessageSource::Template,
                ai_error: None,
            };
        };

        let prefix = self.prefix(group);
        let max_description = max_description_length(&prefix);
        let prompt = build_message_prompt(group, diff, &prefix, max_description);
        debug!(group = group.index, prompt_len = prompt.len(), "Requesting commit message");

        match service.complete(&prompt, MESSAGE_SYSTEM).await {
            Ok(text) => Composed {
                message: self.from_ai_text(&text, group),
                source: MessageSource::Ai,
                ai_error: None,
            },
            Err(e) => {
                warn!("AI message generation failed for GROUP {}: {e}", group.index);
                Composed {
                    message: self.template(group),
                    source: MessageSource::Template,
                    ai_error: Some(e),
                }
            }
        }
    }

    /// Ask the service to revise `current` according to `instruction`.
    pub async fn adjust(
        &self,
        current: &CommitMessage,
        instruction: &str,
        group: &Group,
    ) -> Result<CommitMessage, CompletionError> {
        let service = self.service.ok_or(CompletionError::MissingApiKey)?;
        let prefix = self.prefix(group);
        let max_description = max_description_length(&prefix);

        let without_trailers = CommitMessage {
            trailers: Vec::new(),
            ..current.clone()
        };
        let prompt = build_adjust_prompt(
            &without_trailers.format(),
            instruction,
            &prefix,
            max_description,
        );

        let text = service.complete(&prompt, MESSAGE_SYSTEM).await?;
        Ok(self.from_ai_text(&text, group))
    }

    /// `[emoji ]type[(scope)]: description`; long descriptions continue in the body.
    pub fn template(&self, group: &Group) -> CommitMessage {
        self.from_description(group, &group.description)
    }

    /// Template message built from an operator-supplied description.
    pub fn manual(&self, group: &Group, description: &str) -> CommitMessage {
        self.from_description(group, description)
    }

    fn from_description(&self, group: &Group, description: &str) -> CommitMessage {
        let prefix = self.prefix(group);
        let description = description.trim();
        let description = if description.is_empty() {
            default_description(group)
        } else {
            description.to_string()
        };

        let max = max_description_length(&prefix);
        let (short, body) = if description.chars().count() <= max {
            (lowercase_first(&description), None)
        } else {
            (shorten(&description, max), Some(description.clone()))
        };

        CommitMessage {
            summary: format!("{prefix} {short}"),
            body,
            trailers: Vec::new(),
        }
        .with_trailers(&self.trailers)
    }

    fn from_ai_text(&self, text: &str, group: &Group) -> CommitMessage {
        let cleaned = clean_ai_output(text);
        let mut message = CommitMessage::from_text(&cleaned);
        let fallback = if group.description.trim().is_empty() {
            default_description(group)
        } else {
            group.description.clone()
        };
        message.summary = with_prefix(&message.summary, &self.prefix(group), &fallback);
        message.with_trailers(&self.trailers)
    }
}

fn default_description(group: &Group) -> String {
    match group.files.as_slice() {
        [one] => format!("update {one}"),
        files => format!("update {} files", files.len()),
    }
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if chars.clone().next().is_some_and(|c| c.is_lowercase()) => {
            first.to_lowercase().chain(chars).collect()
        }
        _ => text.to_string(),
    }
}

/// Cut `text` to at most `max` characters at a word boundary.
fn shorten(text: &str, max: usize) -> String {
    let mut out = String::new();
    for word in text.split_whitespace() {
        let needed = if out.is_empty() { word.chars().count() } else { out.chars().count() + 1 + word.chars().count() };
        if needed > max {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        text.chars().take(max).collect()
    } else {
        lowercase_first(&out)
    }
}
