//! Prompt construction for grouping, message composition and adjustment.

use crate::commit::group::{CommitType, Group};
use crate::git::changes::{ChangeSet, DiffSummary};

/// Maximum length for sanitized diff text.
const MAX_DIFF_SANITIZED_LENGTH: usize = 30_000;

/// System instructions for the grouping request.
pub const GROUPING_SYSTEM: &str = "You split uncommitted changes into logically atomic conventional commits. \
You answer only in the exact plain-text format requested, with no preamble, no markdown and no commentary.";

/// System instructions for message composition and adjustment.
pub const MESSAGE_SYSTEM: &str = "You write git commit messages that follow the Conventional Commits format. \
You answer with the commit message only: the summary line, a blank line, then the body. No markdown, no quotes, no commentary.";

/// Build the prompt asking the service to partition `changes` into groups.
pub fn build_grouping_prompt(changes: &ChangeSet, diff: &DiffSummary) -> String {
    let files_section = changes
        .files
        .iter()
        .map(|f| match &f.old_path {
            Some(old) => format!("- {} ({}, from {old})", f.path, f.status),
            None => format!("- {} ({})", f.path, f.status),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let types = CommitType::ALL
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let sanitized_diff = sanitize_diff(&diff.diff_text, MAX_DIFF_SANITIZED_LENGTH);
    let truncation_note = if diff.truncated {
        "\n\nNote: The diff was truncated due to size. Use the file list for anything not shown."
    } else {
        ""
    };

    format!(
        r#"Group the following uncommitted changes into logically atomic commits.

## Changed Files ({file_count} files, {additions} additions, {deletions} deletions)
{files_section}

## Diff
```
{sanitized_diff}
```{truncation_note}

## Rules
1. Files that are part of the same feature, fix or refactor go in the same group
2. Test files go with the code they test unless the change is test-only
3. Every file listed above must appear in exactly one group
4. Only use paths from the list above, copied exactly
5. Order groups so that foundational changes come first
6. If unsure whether to split, prefer fewer groups
7. Type must be one of: {types}
8. Scope is a short lowercase token (letters, digits, dash, underscore; at most 20 characters) or NONE

## Response Format (STRICT)
Start your answer with "GROUP 1:" and use exactly this shape for every group:

GROUP 1: <type>
Scope: <scope or NONE>
Description: <one line explaining the change>
Files:
- <path>
- <path>

GROUP 2: <type>
..."#,
        file_count = changes.len(),
        additions = diff.additions,
        deletions = diff.deletions,
    )
}

/// Build the prompt for one group's commit message.
///
/// `max_description` is the room left on the summary line after `prefix`.
pub fn build_message_prompt(
    group: &Group,
    diff: &DiffSummary,
    prefix: &str,
    max_description: usize,
) -> String {
    let files_section = group
        .files
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");

    let sanitized_diff = sanitize_diff(&diff.diff_text, MAX_DIFF_SANITIZED_LENGTH);
    let truncation_note = if diff.truncated {
        "\n\nNote: The diff was truncated due to size. Focus on the visible changes."
    } else {
        ""
    };

    format!(
        r#"Write the commit message for this group of changes.

## Group
Type: {commit_type}
Scope: {scope}
Description: {description}
Files:
{files_section}

## Diff
```
{sanitized_diff}
```{truncation_note}

## Summary Line Rules (STRICT)
- The summary line MUST start with exactly `{prefix} ` followed by the description
- HARD LIMIT: the description after the prefix MUST be at most {max_description} characters, so the whole line stays within 72 characters
- Imperative mood ("add", "fix", "remove"), lowercase after the colon, no period at the end

## Body Rules
- Separate the body from the summary with exactly one blank line
- Explain the motivation and impact of the change, not a file-by-file list
- Wrap lines at 72 characters"#,
        commit_type = group.commit_type,
        scope = group.scope.as_deref().unwrap_or("NONE"),
        description = sanitize_line(&group.description),
    )
}

/// Build the prompt asking the service to revise `current` per `instruction`.
pub fn build_adjust_prompt(
    current: &str,
    instruction: &str,
    prefix: &str,
    max_description: usize,
) -> String {
    format!(
        r#"Revise this commit message according to the instruction.

## Current Message
{current}

## Instruction
{instruction}

## Rules (STRICT)
- Keep the summary line prefix `{prefix} `
- The description after the prefix MUST be at most {max_description} characters
- Keep exactly one blank line between the summary and the body
- Answer with the full revised message only"#,
        current = current.trim(),
        instruction = sanitize_line(instruction),
    )
}

/// Strip ANSI escapes and control characters, then cap at `max_len` bytes on a char boundary.
pub fn sanitize_diff(diff: &str, max_len: usize) -> String {
    let cleaned = remove_control_chars(&strip_escapes(diff));
    if cleaned.len() <= max_len {
        return cleaned;
    }
    let mut end = max_len;
    while end > 0 && !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = cleaned[..end].to_string();
    truncated.push_str("\n[... truncated]");
    truncated
}

fn sanitize_line(text: &str) -> String {
    remove_control_chars(&strip_escapes(text))
        .replace('\n', " ")
        .replace("```", "'''")
        .trim()
        .to_string()
}

/// Remove terminal escape sequences, keeping tabs (the stripper only re-emits newlines).
fn strip_escapes(text: &str) -> String {
    text.split('\t')
        .map(strip_ansi_escapes::strip_str)
        .collect::<Vec<_>>()
        .join("\t")
}

/// Drop control characters except newline and tab.
fn remove_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
