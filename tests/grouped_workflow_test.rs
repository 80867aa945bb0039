//! End-to-end tests for the grouped-commit workflow against real repositories,
//! driven by a canned completion service and a scripted operator.

mod common;

use common::{CannedCompletion, ScriptedOperator, TestRepo, grouping_response};

use gitgroup::config::{Config, TypePolicy};
use gitgroup::error::{CommitError, CompletionError, ParseError, PreflightError, ServiceErrorKind, WorkflowError};
use gitgroup::git::RestoreOutcome;
use gitgroup::workflow::operator::Decision;
use gitgroup::workflow::restore::RestoreHook;
use gitgroup::workflow::{GroupedCommit, SkipReason, WorkflowReport};

async fn run_workflow(
    repo: &TestRepo,
    config: &Config,
    service: &CannedCompletion,
    operator: &mut ScriptedOperator,
) -> Result<WorkflowReport, WorkflowError> {
    GroupedCommit::new(config, &repo.repo, service, operator, RestoreHook::new())
        .run()
        .await
}

fn template_config(repo: &TestRepo) -> Config {
    let mut config = repo.config();
    config.ai_messages = false;
    config
}

#[tokio::test]
async fn test_single_group_commits_both_files() {
    let repo = TestRepo::with_files(&[("README.md", "# demo\n")]);
    repo.write("a.ts", "export const a = 1;\n");
    repo.write("a.test.ts", "test('a', () => {});\n");

    let service = CannedCompletion::new()
        .reply(&grouping_response(&[(
            "feat",
            "NONE",
            "Add module a with tests",
            &["a.ts", "a.test.ts"],
        )]))
        .reply("feat: add module a\n\nIntroduce module a and cover it with a test.");
    let mut operator = ScriptedOperator::new();

    let report = run_workflow(&repo, &repo.config(), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits_created(), 1);
    assert_eq!(repo.commit_count(), 2);
    assert_eq!(repo.files_at(0), vec!["a.test.ts", "a.ts"]);
    assert_eq!(
        repo.message_at(0),
        "feat: add module a\n\nIntroduce module a and cover it with a test.\n"
    );
    // One group: no count confirmation.
    assert!(!operator.prompts.iter().any(|p| p.starts_with("Create ")));
    assert!(repo.staged().is_empty());
}

#[tokio::test]
async fn test_two_groups_commit_in_order() {
    let repo = TestRepo::with_files(&[("x.ts", "x\n"), ("y.ts", "y\n")]);
    repo.write("x.ts", "x fixed\n");
    repo.write("y.ts", "y documented\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[
        ("fix", "NONE", "Fix x", &["x.ts"]),
        ("docs", "NONE", "Document y", &["y.ts"]),
    ]));
    let mut operator = ScriptedOperator::new()
        .confirms(&[true])
        .decisions(&[Decision::Confirm, Decision::Confirm]);

    let report = run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits_created(), 2);
    assert_eq!(repo.commit_count(), 3);
    assert_eq!(repo.files_at(1), vec!["x.ts"]);
    assert!(repo.message_at(1).starts_with("fix: fix x"));
    assert_eq!(repo.files_at(0), vec!["y.ts"]);
    assert!(repo.message_at(0).starts_with("docs: document y"));
    assert_eq!(operator.prompts[0], "Create 2 commits from these groups?");
}

#[tokio::test]
async fn test_operator_skip_leaves_group_uncommitted() {
    let repo = TestRepo::with_files(&[("x.ts", "x\n"), ("y.ts", "y\n")]);
    repo.write("x.ts", "x reworked\n");
    repo.write("y.ts", "y documented\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[
        ("refactor", "NONE", "Rework x", &["x.ts"]),
        ("docs", "NONE", "Document y", &["y.ts"]),
    ]));
    let mut operator = ScriptedOperator::new()
        .confirms(&[true])
        .decisions(&[Decision::Skip, Decision::Confirm]);

    let report = run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.skipped, vec![(1, SkipReason::Operator)]);
    assert_eq!(report.commits_created(), 1);
    assert_eq!(report.commits[0].group, 2);
    assert_eq!(repo.commit_count(), 2);
    assert_eq!(repo.files_at(0), vec!["y.ts"]);
    // The next group's staging unstaged x.ts; the edit stays in the working tree.
    assert!(repo.staged().is_empty());
    assert_eq!(repo.read("x.ts"), "x reworked\n");
}

#[tokio::test]
async fn test_skipping_last_group_leaves_it_staged() {
    let repo = TestRepo::with_files(&[("x.ts", "x\n"), ("y.ts", "y\n")]);
    repo.write("x.ts", "x fixed\n");
    repo.write("y.ts", "y documented\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[
        ("fix", "NONE", "Fix x", &["x.ts"]),
        ("docs", "NONE", "Document y", &["y.ts"]),
    ]));
    let mut operator = ScriptedOperator::new()
        .confirms(&[true])
        .decisions(&[Decision::Confirm, Decision::Skip]);

    let report = run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.skipped, vec![(2, SkipReason::Operator)]);
    assert_eq!(repo.files_at(0), vec!["x.ts"]);
    assert_eq!(repo.staged(), vec!["y.ts"]);
}

#[tokio::test]
async fn test_prose_response_is_parse_error_and_tree_untouched() {
    let repo = TestRepo::with_files(&[("a.txt", "a\n"), ("b.txt", "b\n")]);
    repo.write("a.txt", "a staged\n");
    repo.stage(&["a.txt"]);
    repo.write("b.txt", "b unstaged\n");

    let service = CannedCompletion::new().reply("I think you should commit everything together.");
    let mut operator = ScriptedOperator::new();

    let err = run_workflow(&repo, &repo.config(), &service, &mut operator)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Parse(ParseError::MissingGroupMarker { .. })
    ));
    assert_eq!(repo.commit_count(), 1);
    assert_eq!(repo.staged(), vec!["a.txt"]);
    assert_eq!(repo.read("b.txt"), "b unstaged\n");
}

#[tokio::test]
async fn test_overlapping_group_with_nothing_left_is_skipped() {
    let repo = TestRepo::with_files(&[("x.ts", "x\n"), ("y.ts", "y\n"), ("z.ts", "z\n")]);
    repo.write("x.ts", "x2\n");
    repo.write("y.ts", "y2\n");
    repo.write("z.ts", "z2\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[
        ("feat", "core", "Rework x and y", &["x.ts", "y.ts"]),
        ("fix", "NONE", "Fix y", &["y.ts"]),
        ("test", "NONE", "Cover z", &["z.ts"]),
    ]));
    let mut operator = ScriptedOperator::new().confirms(&[true]);

    let report = run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits_created(), 2);
    assert_eq!(report.skipped, vec![(2, SkipReason::NothingStaged)]);
    assert_eq!(repo.files_at(1), vec!["x.ts", "y.ts"]);
    assert_eq!(repo.files_at(0), vec!["z.ts"]);
    // Group 2 never reached the decision prompt.
    assert!(!operator.prompts.iter().any(|p| p == "decide GROUP 2/3"));
}

#[tokio::test]
async fn test_abort_at_second_group_restores_original_staging() {
    let repo = TestRepo::with_files(&[
        ("p.ts", "p\n"),
        ("x.ts", "x\n"),
        ("y.ts", "y\n"),
        ("z.ts", "z\n"),
    ]);
    repo.write("p.ts", "p staged before the run\n");
    repo.stage(&["p.ts"]);
    repo.write("x.ts", "x2\n");
    repo.write("y.ts", "y2\n");
    repo.write("z.ts", "z2\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[
        ("feat", "NONE", "Change x", &["x.ts"]),
        ("fix", "NONE", "Change y", &["y.ts"]),
        ("chore", "NONE", "Change z", &["z.ts"]),
    ]));
    let mut operator = ScriptedOperator::new()
        .confirms(&[true])
        .decisions(&[Decision::Confirm, Decision::AbortAll]);

    let report = run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    assert!(report.aborted());
    assert_eq!(report.aborted_at, Some(2));
    assert_eq!(report.not_reached, vec![3]);
    assert_eq!(report.commits_created(), 1);
    assert_eq!(repo.commit_count(), 2);
    assert_eq!(repo.files_at(0), vec!["x.ts"]);

    assert_eq!(report.restore, Some(RestoreOutcome::Applied));
    assert_eq!(repo.staged(), vec!["p.ts"]);
    assert_eq!(repo.read("y.ts"), "y2\n");
    assert_eq!(repo.read("z.ts"), "z2\n");
}

#[tokio::test]
async fn test_dry_run_makes_no_commits_and_restores_index() {
    let repo = TestRepo::with_files(&[("a.txt", "a\n"), ("b.txt", "b\n")]);
    repo.write("a.txt", "a staged\n");
    repo.stage(&["a.txt"]);
    repo.write("b.txt", "b changed\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[
        ("fix", "NONE", "Change a", &["a.txt"]),
        ("docs", "NONE", "Change b", &["b.txt"]),
    ]));
    let mut config = template_config(&repo);
    config.dry_run = true;
    let mut operator = ScriptedOperator::new().confirms(&[true]);

    let report = run_workflow(&repo, &config, &service, &mut operator)
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.commits.len(), 2);
    assert_eq!(report.commits_created(), 0);
    assert_eq!(repo.commit_count(), 1);
    assert_eq!(repo.staged(), vec!["a.txt"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_commit_failure_is_a_skip_not_an_abort() {
    let repo = TestRepo::with_files(&[("x.ts", "x\n"), ("y.ts", "y\n")]);
    repo.write("x.ts", "x2\n");
    repo.write("y.ts", "y2\n");
    repo.install_hook("pre-commit", "#!/bin/sh\necho 'rejected by hook' >&2\nexit 1\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[
        ("fix", "NONE", "Change x", &["x.ts"]),
        ("fix", "NONE", "Change y", &["y.ts"]),
    ]));
    let mut operator = ScriptedOperator::new().confirms(&[true]);

    let report = run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits_created(), 0);
    assert_eq!(report.skipped.len(), 2);
    assert!(matches!(&report.skipped[0], (1, SkipReason::CommitFailed(msg)) if msg.contains("rejected by hook")));
    assert!(matches!(&report.skipped[1], (2, SkipReason::CommitFailed(_))));
    assert!(!report.aborted());
}

#[tokio::test]
async fn test_locked_index_makes_staging_failure_a_skip() {
    let repo = TestRepo::with_files(&[("a.rs", "a\n")]);
    repo.write("a.rs", "a2\n");
    std::fs::write(repo.path().join(".git/index.lock"), "").unwrap();

    let service = CannedCompletion::new().reply(&grouping_response(&[(
        "fix",
        "NONE",
        "Change a",
        &["a.rs"],
    )]));
    let mut operator = ScriptedOperator::new();

    let report = run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits_created(), 0);
    assert!(matches!(
        &report.skipped[..],
        [(1, SkipReason::StagingFailed(msg))] if msg.contains("index.lock")
    ));
    assert!(!operator.prompts.iter().any(|p| p.starts_with("decide")));
    assert_eq!(repo.commit_count(), 1);
}

#[tokio::test]
async fn test_adjust_requests_revised_message() {
    let repo = TestRepo::with_files(&[("parser.rs", "fn parse() {}\n")]);
    repo.write("parser.rs", "fn parse() { /* handle empty */ }\n");

    let service = CannedCompletion::new()
        .reply(&grouping_response(&[(
            "fix",
            "parser",
            "Handle empty input",
            &["parser.rs"],
        )]))
        .reply("fix(parser): handle empty input")
        .reply("fix(parser): return early on empty input\n\nAvoids indexing an empty buffer.");
    let mut operator = ScriptedOperator::new()
        .decisions(&[Decision::Adjust, Decision::Confirm])
        .inputs(&["mention the early return"]);

    run_workflow(&repo, &repo.config(), &service, &mut operator)
        .await
        .unwrap();

    let calls = service.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[2].0.contains("fix(parser): handle empty input"));
    assert!(calls[2].0.contains("mention the early return"));
    assert_eq!(
        repo.message_at(0),
        "fix(parser): return early on empty input\n\nAvoids indexing an empty buffer.\n"
    );
}

#[tokio::test]
async fn test_adjust_without_ai_asks_for_manual_description() {
    let repo = TestRepo::with_files(&[("parser.rs", "fn parse() {}\n")]);
    repo.write("parser.rs", "fn parse() { todo!() }\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[(
        "fix",
        "NONE",
        "Old description",
        &["parser.rs"],
    )]));
    let mut operator = ScriptedOperator::new()
        .decisions(&[Decision::Adjust, Decision::Confirm])
        .inputs(&["Handle empty input"]);

    run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(service.calls().len(), 1);
    assert!(operator.prompts.iter().any(|p| p == "Commit description"));
    assert_eq!(repo.message_at(0), "fix: handle empty input\n");
}

#[tokio::test]
async fn test_long_summary_needs_override() {
    let repo = TestRepo::with_files(&[("a.rs", "a\n")]);
    repo.write("a.rs", "a2\n");

    let long_summary = format!("feat: {}", "x".repeat(70));
    let service = CannedCompletion::new()
        .reply(&grouping_response(&[("feat", "NONE", "Change a", &["a.rs"])]))
        .reply(&long_summary);
    let mut operator = ScriptedOperator::new()
        .decisions(&[Decision::Confirm, Decision::Confirm])
        .confirms(&[false, true]);

    run_workflow(&repo, &repo.config(), &service, &mut operator)
        .await
        .unwrap();

    let overrides = operator
        .prompts
        .iter()
        .filter(|p| p.contains("76 characters"))
        .count();
    assert_eq!(overrides, 2);
    assert_eq!(repo.message_at(0), format!("{long_summary}\n"));
}

#[tokio::test]
async fn test_declined_group_count_makes_no_changes() {
    let repo = TestRepo::with_files(&[("x.ts", "x\n"), ("y.ts", "y\n")]);
    repo.write("x.ts", "x2\n");
    repo.write("y.ts", "y2\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[
        ("fix", "NONE", "x", &["x.ts"]),
        ("fix", "NONE", "y", &["y.ts"]),
    ]));
    let mut operator = ScriptedOperator::new().confirms(&[false]);

    let err = run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::GroupingDeclined));
    assert_eq!(repo.commit_count(), 1);
    assert!(repo.staged().is_empty());
}

#[tokio::test]
async fn test_auto_confirm_skips_group_count_prompt() {
    let repo = TestRepo::with_files(&[("x.ts", "x\n"), ("y.ts", "y\n")]);
    repo.write("x.ts", "x2\n");
    repo.write("y.ts", "y2\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[
        ("fix", "NONE", "x", &["x.ts"]),
        ("fix", "NONE", "y", &["y.ts"]),
    ]));
    let mut config = template_config(&repo);
    config.auto_confirm = true;
    let mut operator = ScriptedOperator::new();

    let report = run_workflow(&repo, &config, &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits_created(), 2);
    assert!(!operator.prompts.iter().any(|p| p.starts_with("Create ")));
}

#[tokio::test]
async fn test_grouping_service_error_is_fatal() {
    let repo = TestRepo::with_files(&[("a.rs", "a\n")]);
    repo.write("a.rs", "a2\n");

    let service = CannedCompletion::new().fail(CompletionError::Service {
        kind: ServiceErrorKind::Authentication,
        message: "invalid x-api-key".to_string(),
    });
    let mut operator = ScriptedOperator::new();

    let err = run_workflow(&repo, &repo.config(), &service, &mut operator)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Completion(CompletionError::Service {
            kind: ServiceErrorKind::Authentication,
            ..
        })
    ));
    assert_eq!(repo.commit_count(), 1);
}

#[tokio::test]
async fn test_persistent_message_error_stops_further_ai_calls() {
    let repo = TestRepo::with_files(&[("x.ts", "x\n"), ("y.ts", "y\n")]);
    repo.write("x.ts", "x2\n");
    repo.write("y.ts", "y2\n");

    let service = CannedCompletion::new()
        .reply(&grouping_response(&[
            ("fix", "NONE", "Fix x", &["x.ts"]),
            ("docs", "NONE", "Document y", &["y.ts"]),
        ]))
        .fail(CompletionError::Service {
            kind: ServiceErrorKind::Permission,
            message: "model not allowed".to_string(),
        });
    let mut operator = ScriptedOperator::new().confirms(&[true]);

    let report = run_workflow(&repo, &repo.config(), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits_created(), 2);
    assert_eq!(service.calls().len(), 2);
    assert_eq!(repo.message_at(1), "fix: fix x\n");
    assert_eq!(repo.message_at(0), "docs: document y\n");
}

#[tokio::test]
async fn test_unknown_paths_are_never_committed() {
    let repo = TestRepo::with_files(&[("a.rs", "a\n")]);
    repo.write("a.rs", "a2\n");
    repo.write("untouched_by_ai.rs", "new\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[(
        "feat",
        "NONE",
        "Change a",
        &["a.rs", "../outside.rs", "ghost.rs"],
    )]));
    let mut operator = ScriptedOperator::new();

    let report = run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(report.commits_created(), 1);
    assert_eq!(repo.files_at(0), vec!["a.rs"]);
    assert_eq!(repo.read("untouched_by_ai.rs"), "new\n");
}

#[tokio::test]
async fn test_grouping_prompt_omits_ignored_tracked_files() {
    let repo = TestRepo::with_files(&[("app.rs", "a\n"), ("build.log", "old log\n")]);
    repo.write(".gitignore", "*.log\n");
    repo.write("build.log", "LOG_ONLY_MARKER\n");
    repo.write("app.rs", "APP_CHANGE_MARKER\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[(
        "chore",
        "NONE",
        "Ignore logs",
        &[".gitignore", "app.rs"],
    )]));
    let mut operator = ScriptedOperator::new();

    run_workflow(&repo, &template_config(&repo), &service, &mut operator)
        .await
        .unwrap();

    let grouping_prompt = &service.calls()[0].0;
    assert!(grouping_prompt.contains("APP_CHANGE_MARKER"));
    assert!(!grouping_prompt.contains("LOG_ONLY_MARKER"));
    assert_eq!(repo.files_at(0), vec![".gitignore", "app.rs"]);
}

#[tokio::test]
async fn test_strict_types_rejects_unknown_type() {
    let repo = TestRepo::with_files(&[("a.rs", "a\n")]);
    repo.write("a.rs", "a2\n");

    let service = CannedCompletion::new().reply(&grouping_response(&[(
        "perf",
        "NONE",
        "Speed up a",
        &["a.rs"],
    )]));
    let mut config = template_config(&repo);
    config.type_policy = TypePolicy::Reject;
    let mut operator = ScriptedOperator::new();

    let err = run_workflow(&repo, &config, &service, &mut operator)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Parse(ParseError::UnknownType { .. })));
}

#[tokio::test]
async fn test_no_changes_is_an_error() {
    let repo = TestRepo::with_files(&[("a.rs", "a\n")]);
    let service = CannedCompletion::new();
    let mut operator = ScriptedOperator::new();

    let err = run_workflow(&repo, &repo.config(), &service, &mut operator)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Commit(CommitError::NoChanges)));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_merge_in_progress_declined_is_precondition_error() {
    let repo = TestRepo::with_files(&[("a.rs", "a\n")]);
    repo.write("a.rs", "a2\n");
    let head = repo.repo.head().unwrap().target().unwrap();
    std::fs::write(repo.path().join(".git/MERGE_HEAD"), format!("{head}\n")).unwrap();

    let service = CannedCompletion::new();
    let mut operator = ScriptedOperator::new();

    let err = run_workflow(&repo, &repo.config(), &service, &mut operator)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Preflight(PreflightError::OperationInProgress(ref op)) if op == "merge"
    ));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_deletion_and_emoji_trailers() {
    let repo = TestRepo::with_files(&[("old.md", "old\n"), ("keep.md", "keep\n")]);
    repo.remove("old.md");

    let service = CannedCompletion::new().reply(&grouping_response(&[(
        "docs",
        "NONE",
        "Remove old notes",
        &["old.md"],
    )]));
    let mut config = template_config(&repo);
    config.emoji = true;
    config.trailers = vec!["Co-authored-by: Ada <ada@example.com>".to_string()];
    let mut operator = ScriptedOperator::new();

    run_workflow(&repo, &config, &service, &mut operator)
        .await
        .unwrap();

    assert_eq!(repo.files_at(0), vec!["old.md"]);
    assert_eq!(
        repo.message_at(0),
        "📝 docs: remove old notes\n\nCo-authored-by: Ada <ada@example.com>\n"
    );
}
