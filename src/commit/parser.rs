//! Strict parser for grouping responses.
//!
//! Expected shape:
//!
//! ```text
//! GROUP 1: feat
//! Scope: auth
//! Description: Add login endpoint
//! Files:
//! - src/auth/login.rs
//! - tests/login_test.rs
//! ```
//!
//! The response must start with `GROUP 1:` and headers must be numbered
//! consecutively. Anything else is rejected rather than repaired.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::{debug, warn};

use crate::commit::group::{CommitType, Group, normalize_scope};
use crate::config::TypePolicy;
use crate::error::ParseError;
use crate::git::changes::ChangeSet;
use crate::llm::extract::excerpt;

static GROUP_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*GROUP[ \t]+(\d+):[ \t]*(.*)$").ok());

static FIRST_GROUP: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^GROUP[ \t]+1:").ok());

const STATUS_SUFFIXES: [&str; 4] = [" (Added)", " (Modified)", " (Deleted)", " (Renamed)"];

/// Result of a successful parse.
#[derive(Debug, Clone)]
pub struct ParsedGroups {
    /// Groups with at least one file, in ascending index order.
    pub groups: Vec<Group>,
    /// Indexes of groups dropped because they listed no files.
    pub dropped: Vec<usize>,
    /// Number of `GROUP n:` headers found.
    pub header_count: usize,
}

/// Parses grouping responses under a commit type policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupParser {
    policy: TypePolicy,
}

struct Header<'t> {
    number: usize,
    raw_type: &'t str,
    line_start: usize,
    body_start: usize,
}

impl GroupParser {
    pub fn new(policy: TypePolicy) -> Self {
        Self { policy }
    }

    pub fn parse(&self, text: &str) -> Result<ParsedGroups, ParseError> {
        let text = text.trim();
        let missing_marker = || ParseError::MissingGroupMarker {
            excerpt: excerpt(text, 200),
        };

        let starts_with_marker = FIRST_GROUP.as_ref().is_some_and(|re| re.is_match(text));
        if !starts_with_marker {
            return Err(missing_marker());
        }

        let headers = self.headers(text)?;
        if headers.is_empty() {
            return Err(missing_marker());
        }
        debug!(headers = headers.len(), "Found group headers");

        let mut groups = Vec::new();
        let mut dropped = Vec::new();

        for (i, header) in headers.iter().enumerate() {
            let end = headers.get(i + 1).map_or(text.len(), |next| next.line_start);
            let span = &text[header.body_start..end];
            let group = self.parse_group(header, span)?;

            if group.files.is_empty() {
                warn!("Dropping GROUP {}: no files listed", group.index);
                dropped.push(group.index);
            } else {
                groups.push(group);
            }
        }

        Ok(ParsedGroups {
            groups,
            dropped,
            header_count: headers.len(),
        })
    }

    fn headers<'t>(&self, text: &'t str) -> Result<Vec<Header<'t>>, ParseError> {
        let Some(re) = GROUP_HEADER.as_ref() else {
            return Ok(Vec::new());
        };

        let mut headers = Vec::new();
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(number), Some(raw_type)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let expected = headers.len() + 1;
            let found = number.as_str().parse::<usize>().unwrap_or(0);
            if found != expected {
                return Err(ParseError::OutOfSequence { expected, found });
            }
            headers.push(Header {
                number: found,
                raw_type: raw_type.as_str(),
                line_start: whole.start(),
                body_start: whole.end(),
            });
        }
        Ok(headers)
    }

    fn parse_group(&self, header: &Header<'_>, span: &str) -> Result<Group, ParseError> {
        let raw_type = header
            .raw_type
            .trim()
            .trim_matches(|c: char| c == '*' || c == '`')
            .to_lowercase();
        let commit_type = CommitType::normalize(&raw_type, self.policy).ok_or_else(|| {
            ParseError::UnknownType {
                index: header.number,
                raw: raw_type.clone(),
            }
        })?;

        let mut scope = None;
        let mut scope_seen = false;
        let mut description = String::new();
        let mut files: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        for line in span.lines() {
            let line = line.trim();
            if let Some(value) = strip_label(line, "scope:") {
                if !scope_seen {
                    scope = normalize_scope(value);
                    scope_seen = true;
                }
            } else if let Some(value) = strip_label(line, "description:") {
                if description.is_empty() {
                    description = value.trim().to_string();
                }
            } else if let Some(path) = bullet_path(line)
                && seen.insert(path.clone())
            {
                files.push(path);
            }
        }

        Ok(Group {
            index: header.number,
            commit_type,
            scope,
            description,
            files,
        })
    }
}

/// Case-insensitive `Label:` prefix match, returning the rest of the line.
fn strip_label<'l>(line: &'l str, label: &str) -> Option<&'l str> {
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        line.get(label.len()..)
    } else {
        None
    }
}

/// Path from a `- path` or `* path` bullet, cleaned of quoting and status notes.
fn bullet_path(line: &str) -> Option<String> {
    let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))?
        .trim();

    let mut path = rest;
    for suffix in STATUS_SUFFIXES {
        if let Some(stripped) = path.strip_suffix(suffix) {
            path = stripped;
            break;
        }
    }

    let path = path.trim().trim_matches(|c| c == '`' || c == '"' || c == '\'');
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// How parsed groups line up with the ChangeSet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReport {
    /// ChangeSet paths not listed by any group.
    pub excluded: Vec<String>,
    /// (group index, path) pairs removed because the path is not in the ChangeSet.
    pub unknown: Vec<(usize, String)>,
    /// Paths listed by more than one group, with the groups that list them.
    pub overlaps: Vec<(String, Vec<usize>)>,
    /// Groups dropped because nothing valid remained.
    pub dropped_empty: Vec<usize>,
}

/// Restrict `groups` to paths in `changes` and describe the differences.
///
/// Old paths of renames are mapped to their new path. Overlaps are kept in
/// every group that lists them; the first group to commit a shared file takes
/// it, and later groups find nothing left to stage for it.
pub fn reconcile(groups: Vec<Group>, changes: &ChangeSet) -> (Vec<Group>, GroupReport) {
    let renamed_from: HashMap<String, String> = changes
        .renames()
        .into_iter()
        .map(|(new, old)| (old, new))
        .collect();

    let mut report = GroupReport::default();
    let mut kept = Vec::new();
    let mut owners: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for mut group in groups {
        let mut files = Vec::new();
        for path in group.files.drain(..) {
            let path = renamed_from.get(&path).cloned().unwrap_or(path);
            if !changes.contains(&path) {
                warn!("GROUP {} lists '{}', which has no pending changes; ignoring it", group.index, path);
                report.unknown.push((group.index, path));
                continue;
            }
            if !files.contains(&path) {
                files.push(path);
            }
        }

        if files.is_empty() {
            warn!("Dropping GROUP {}: none of its files have pending changes", group.index);
            report.dropped_empty.push(group.index);
            continue;
        }

        for path in &files {
            owners.entry(path.clone()).or_default().push(group.index);
        }
        group.files = files;
        kept.push(group);
    }

    report.overlaps = owners
        .iter()
        .filter(|(_, groups)| groups.len() > 1)
        .map(|(path, groups)| (path.clone(), groups.clone()))
        .collect();

    report.excluded = changes
        .paths()
        .filter(|p| !owners.contains_key(*p))
        .map(String::from)
        .collect();

    (kept, report)
}
