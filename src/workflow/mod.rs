//! The grouped-commit workflow.
//!
//! Flow: collect changes, ask the completion service for groups, confirm the
//! group count, then for each group stage, compose, decide and commit. The
//! index snapshot taken before the first group is reapplied on every exit path.
//! Index writes go through [`RestoreHook::exclusive`] so an interrupt restore
//! never interleaves with them.

pub mod operator;
pub mod restore;

use std::fmt;

use git2::Repository;
use tracing::{debug, info, warn};

use crate::commit::group::Group;
use crate::commit::message::{CommitMessage, MessageComposer, ValidationIssue};
use crate::commit::parser::{GroupParser, GroupReport, reconcile};
use crate::config::Config;
use crate::error::{CommitError, CompletionError, PreflightError, WorkflowError};
use crate::git::changes::{ChangeSet, DiffSummary, collect_changes, collect_diff_for_paths};
use crate::git::cli::GitCli;
use crate::git::preflight::operation_in_progress;
use crate::git::snapshot::{IndexSnapshot, RestoreOutcome};
use crate::git::staging::StagingEngine;
use crate::llm::client::CompletionService;
use crate::llm::prompt::{GROUPING_SYSTEM, build_grouping_prompt};

use operator::{Decision, Operator};
use restore::{RestoreGuard, RestoreHook};

/// Why a group produced no commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Staging left the index unchanged.
    NothingStaged,
    /// The operator chose skip.
    Operator,
    StagingFailed(String),
    CommitFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NothingStaged => write!(f, "nothing to stage"),
            SkipReason::Operator => write!(f, "skipped by operator"),
            SkipReason::StagingFailed(e) => write!(f, "staging failed: {e}"),
            SkipReason::CommitFailed(e) => write!(f, "commit failed: {e}"),
        }
    }
}

/// A commit made (or, in a dry run, that would have been made).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub group: usize,
    /// Short hash; `None` in a dry run.
    pub hash: Option<String>,
    pub summary: String,
}

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct WorkflowReport {
    pub total_groups: usize,
    pub commits: Vec<CommitRecord>,
    pub skipped: Vec<(usize, SkipReason)>,
    /// Group at which the operator aborted.
    pub aborted_at: Option<usize>,
    /// Groups after the abort point.
    pub not_reached: Vec<usize>,
    pub restore: Option<RestoreOutcome>,
    pub dry_run: bool,
}

impl WorkflowReport {
    /// Commits actually written to the repository.
    pub fn commits_created(&self) -> usize {
        self.commits.iter().filter(|c| c.hash.is_some()).count()
    }

    pub fn aborted(&self) -> bool {
        self.aborted_at.is_some()
    }

    pub fn print_summary(&self) {
        println!();
        if self.dry_run {
            println!(
                "Dry run complete: {} of {} group(s) would be committed. No commits made.",
                self.commits.len(),
                self.total_groups
            );
        } else {
            println!(
                "Created {} commit(s) from {} group(s).",
                self.commits_created(),
                self.total_groups
            );
        }

        for commit in &self.commits {
            let hash = commit.hash.as_deref().unwrap_or("-------");
            println!("  [DONE] {hash} {}", commit.summary);
        }
        for (group, reason) in &self.skipped {
            println!("  [SKIP] GROUP {group}: {reason}");
        }
        if let Some(group) = self.aborted_at {
            println!("  [ABORT] Stopped at GROUP {group}");
        }
        if !self.not_reached.is_empty() {
            let groups = self
                .not_reached
                .iter()
                .map(|g| format!("GROUP {g}"))
                .collect::<Vec<_>>()
                .join(", ");
            println!("  [WAIT] Not reached: {groups}");
        }
        match &self.restore {
            Some(RestoreOutcome::Empty) | None => {}
            Some(outcome @ RestoreOutcome::Failed(_)) => println!("  [WARN] {outcome}"),
            Some(outcome) => println!("  [DONE] {outcome}"),
        }
    }
}

/// States of one group's pass through the workflow.
#[derive(Debug)]
enum Step {
    Staging,
    Composing,
    AwaitingDecision(CommitMessage),
    Adjusting(CommitMessage),
    Committing(CommitMessage),
    Skipping(SkipReason),
}

enum GroupOutcome {
    Committed(CommitRecord),
    Skipped(SkipReason),
    Aborted,
}

/// Drives one grouped-commit run against one repository.
pub struct GroupedCommit<'a, O: Operator> {
    config: &'a Config,
    repo: &'a Repository,
    git: GitCli,
    service: &'a dyn CompletionService,
    operator: &'a mut O,
    hook: RestoreHook,
}

impl<'a, O: Operator> GroupedCommit<'a, O> {
    pub fn new(
        config: &'a Config,
        repo: &'a Repository,
        service: &'a dyn CompletionService,
        operator: &'a mut O,
        hook: RestoreHook,
    ) -> Self {
        let workdir = repo
            .workdir()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| config.repo_path.clone());
        Self {
            config,
            repo,
            git: GitCli::new(workdir),
            service,
            operator,
            hook,
        }
    }

    pub async fn run(&mut self) -> Result<WorkflowReport, WorkflowError> {
        self.check_repository_state()?;

        let changes = collect_changes(self.repo)?;
        info!(files = changes.len(), ignored = changes.ignored, "Collected changes");
        println!("Found {} changed file(s)", changes.len());
        if changes.ignored > 0 {
            println!("  [INFO] {} ignored path(s) excluded", changes.ignored);
        }

        let groups = self.collect_groups(&changes).await?;

        if groups.len() > 1 && !self.config.auto_confirm {
            let confirmed = self.operator.confirm(
                &format!("Create {} commits from these groups?", groups.len()),
                true,
            )?;
            if !confirmed {
                return Err(WorkflowError::GroupingDeclined);
            }
        }

        let snapshot = IndexSnapshot::capture(&self.git)?;
        let guard = RestoreGuard::arm(&self.hook, self.git.clone(), snapshot);

        let staging_git = self.git.clone();
        let staging = StagingEngine::new(&staging_git, &changes);
        let service = self.config.ai_messages.then_some(self.service);
        let composer = MessageComposer::new(service, self.config.emoji, self.config.trailers.clone());
        let mut ai_available = self.config.ai_messages;

        let mut report = WorkflowReport {
            total_groups: groups.len(),
            dry_run: self.config.dry_run,
            ..WorkflowReport::default()
        };

        for (pos, group) in groups.iter().enumerate() {
            println!();
            println!(
                "GROUP {}/{}: {} ({} file(s))",
                group.index,
                groups.len(),
                group.label(),
                group.files.len()
            );

            match self
                .process_group(group, groups.len(), &staging, &composer, &mut ai_available)
                .await?
            {
                GroupOutcome::Committed(record) => report.commits.push(record),
                GroupOutcome::Skipped(reason) => report.skipped.push((group.index, reason)),
                GroupOutcome::Aborted => {
                    report.aborted_at = Some(group.index);
                    report.not_reached = groups[pos + 1..].iter().map(|g| g.index).collect();
                    break;
                }
            }
        }

        // Abort and dry run leave no group staged; otherwise the snapshot goes on top.
        let reset_first = report.aborted() || self.config.dry_run;
        debug!(reset_first, "Restoring original index");
        report.restore = guard.finish(reset_first);

        Ok(report)
    }

    fn check_repository_state(&mut self) -> Result<(), WorkflowError> {
        let Some(operation) = operation_in_progress(self.repo) else {
            return Ok(());
        };
        eprintln!("  [WARN] A {operation} is in progress in this repository.");
        let proceed = self
            .operator
            .confirm(&format!("A {operation} is in progress. Continue anyway?"), false)?;
        if proceed {
            Ok(())
        } else {
            Err(PreflightError::OperationInProgress(operation.to_string()).into())
        }
    }

    /// Ask the service for groups and check them against `changes`.
    async fn collect_groups(&self, changes: &ChangeSet) -> Result<Vec<Group>, WorkflowError> {
        let diff = match collect_diff_for_paths(self.repo, &changes.diff_paths()) {
            Ok(diff) => diff,
            Err(CommitError::NoChanges) => DiffSummary::default(),
            Err(e) => return Err(e.into()),
        };

        let prompt = build_grouping_prompt(changes, &diff);
        debug!(prompt_len = prompt.len(), truncated = diff.truncated, "Grouping prompt built");
        println!("Analyzing changes...");

        let text = self
            .service
            .complete(&prompt, GROUPING_SYSTEM)
            .await
            .map_err(|e| {
                eprintln!("  [FAIL] Grouping needs the completion service: {e}");
                eprintln!("         {}", e.guidance());
                WorkflowError::Completion(e)
            })?;

        let parsed = match GroupParser::new(self.config.type_policy).parse(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("  [FAIL] {e}");
                if let Some(excerpt) = e.excerpt() {
                    eprintln!("  Response began with:");
                    for line in excerpt.lines() {
                        eprintln!("    | {line}");
                    }
                }
                eprintln!("  Nothing was staged. Retry, or commit these changes in a single commit.");
                return Err(e.into());
            }
        };

        debug!(
            headers = parsed.header_count,
            groups = parsed.groups.len(),
            "Parsed grouping response"
        );
        let (groups, report) = reconcile(parsed.groups, changes);
        print_plan(&groups, &report, &parsed.dropped);

        if groups.is_empty() {
            return Err(WorkflowError::NoUsableGroups);
        }
        Ok(groups)
    }

    async fn process_group(
        &mut self,
        group: &Group,
        total: usize,
        staging: &StagingEngine<'_>,
        composer: &MessageComposer<'_>,
        ai_available: &mut bool,
    ) -> Result<GroupOutcome, WorkflowError> {
        let mut step = Step::Staging;

        loop {
            debug!(group = group.index, ?step, "Group step");
            step = match step {
                Step::Staging => match self.hook.exclusive(|| staging.stage_only(&group.files)) {
                    Ok(true) => Step::Composing,
                    Ok(false) => Step::Skipping(SkipReason::NothingStaged),
                    Err(e) => {
                        let detail = e.to_string();
                        warn!("Staging GROUP {} failed: {detail}", group.index);
                        eprintln!("  [FAIL] {}", CommitError::StagingFailed(e));
                        Step::Skipping(SkipReason::StagingFailed(detail))
                    }
                },

                Step::Composing => {
                    let diff = self.group_diff(group);
                    let composed = composer.compose(group, &diff, *ai_available).await;
                    info!(group = group.index, source = ?composed.source, "Composed commit message");
                    if let Some(err) = &composed.ai_error {
                        report_ai_failure(err, ai_available);
                    }
                    Step::AwaitingDecision(composed.message)
                }

                Step::AwaitingDecision(message) => {
                    show_message(&message);
                    match self.operator.decide(group, total)? {
                        Decision::Confirm => {
                            if self.accept_length(&message)? {
                                Step::Committing(message)
                            } else {
                                Step::AwaitingDecision(message)
                            }
                        }
                        Decision::Adjust => Step::Adjusting(message),
                        Decision::Skip => Step::Skipping(SkipReason::Operator),
                        Decision::AbortAll => {
                            println!("  [ABORT] Stopping at GROUP {}", group.index);
                            return Ok(GroupOutcome::Aborted);
                        }
                    }
                }

                Step::Adjusting(message) => {
                    if *ai_available && composer.has_service() {
                        let instruction = self.operator.input("How should the message change?", "")?;
                        if instruction.trim().is_empty() {
                            Step::AwaitingDecision(message)
                        } else {
                            match composer.adjust(&message, &instruction, group).await {
                                Ok(adjusted) => Step::AwaitingDecision(adjusted),
                                Err(e) => {
                                    report_ai_failure(&e, ai_available);
                                    Step::AwaitingDecision(message)
                                }
                            }
                        }
                    } else {
                        let description = self
                            .operator
                            .input("Commit description", &group.description)?;
                        Step::AwaitingDecision(composer.manual(group, &description))
                    }
                }

                Step::Committing(message) => {
                    let summary = message.summary.clone();
                    if self.config.dry_run {
                        println!("  [DRY RUN] Would commit: {summary}");
                        return Ok(GroupOutcome::Committed(CommitRecord {
                            group: group.index,
                            hash: None,
                            summary,
                        }));
                    }
                    let text = message.format();
                    match self.hook.exclusive(|| self.git.commit_with_message(&text)) {
                        Ok(hash) => {
                            println!("  [DONE] {hash} {summary}");
                            return Ok(GroupOutcome::Committed(CommitRecord {
                                group: group.index,
                                hash: Some(hash),
                                summary,
                            }));
                        }
                        Err(e) => {
                            let detail = e.to_string();
                            eprintln!("  [FAIL] {}", CommitError::CommitFailed(e));
                            Step::Skipping(SkipReason::CommitFailed(detail))
                        }
                    }
                }

                Step::Skipping(reason) => {
                    println!("  [SKIP] GROUP {}: {reason}", group.index);
                    return Ok(GroupOutcome::Skipped(reason));
                }
            };
        }
    }

    /// Ask before committing an over-long summary. Declining returns to the decision.
    fn accept_length(&mut self, message: &CommitMessage) -> Result<bool, WorkflowError> {
        let too_long = message
            .validate()
            .into_iter()
            .find(|issue| matches!(issue, ValidationIssue::SummaryTooLong { .. }));
        match too_long {
            Some(issue) => self
                .operator
                .confirm(&format!("The {issue}. Commit anyway?"), false),
            None => Ok(true),
        }
    }

    fn group_diff(&self, group: &Group) -> DiffSummary {
        match collect_diff_for_paths(self.repo, &group.files) {
            Ok(diff) => diff,
            Err(e) => {
                debug!("No diff context for GROUP {}: {e}", group.index);
                DiffSummary::default()
            }
        }
    }
}

fn report_ai_failure(err: &CompletionError, ai_available: &mut bool) {
    eprintln!("  [WARN] AI message unavailable: {err}");
    eprintln!("         {}", err.guidance());
    if err.disables_service() && *ai_available {
        *ai_available = false;
        eprintln!("  [WARN] Using template messages for the remaining groups");
    }
}

fn show_message(message: &CommitMessage) {
    println!();
    for line in message.to_string().lines() {
        println!("    {line}");
    }
    println!();
    for issue in message.validate() {
        println!("  [WARN] {issue}");
    }
}

fn print_plan(groups: &[Group], report: &GroupReport, dropped: &[usize]) {
    println!();
    println!("Proposed {} commit group(s):", groups.len());
    for group in groups {
        println!("  GROUP {}: {} - {}", group.index, group.label(), group.description);
        for file in &group.files {
            println!("    - {file}");
        }
    }

    for index in dropped {
        println!("  [WARN] GROUP {index} listed no files and was dropped");
    }
    for index in &report.dropped_empty {
        println!("  [WARN] GROUP {index} had no files with pending changes and was dropped");
    }
    for (index, path) in &report.unknown {
        println!("  [WARN] GROUP {index} listed {path}, which has no pending changes");
    }

    if !report.overlaps.is_empty() {
        println!();
        println!("  [OVERLAP] Files listed in more than one group:");
        for (path, owners) in &report.overlaps {
            let owners = owners
                .iter()
                .map(|g| format!("GROUP {g}"))
                .collect::<Vec<_>>()
                .join(", ");
            println!("    {path}: {owners}");
        }
        println!("  Each file is committed with the first group that stages it;");
        println!("  later groups listing it may end up with nothing to commit.");
    }

    if !report.excluded.is_empty() {
        println!();
        println!(
            "  [INFO] {} file(s) excluded from grouping; handle them separately:",
            report.excluded.len()
        );
        for path in &report.excluded {
            println!("    - {path}");
        }
    }
}
