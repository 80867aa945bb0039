//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use git2::{Oid, Repository, Signature};

use gitgroup::commit::Group;
use gitgroup::config::Config;
use gitgroup::error::{CompletionError, WorkflowError};
use gitgroup::git::GitCli;
use gitgroup::llm::CompletionService;
use gitgroup::workflow::operator::{Decision, Operator};

/// A test git repository builder for integration tests.
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Create a new empty git repository in a temp directory, configured for
    /// the `git` binary (identity set, signing off).
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let repo = Repository::init(dir.path()).expect("Failed to init git repo");
        {
            let mut config = repo.config().expect("Failed to open repo config");
            config.set_str("user.name", "Test User").expect("Failed to set user.name");
            config
                .set_str("user.email", "test@example.com")
                .expect("Failed to set user.email");
            config
                .set_bool("commit.gpgsign", false)
                .expect("Failed to disable signing");
        }
        Self { dir, repo }
    }

    /// Create a repository with one commit containing `files`.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let test_repo = Self::new();
        for (path, content) in files {
            test_repo.write(path, content);
        }
        test_repo.commit_all("chore: initial commit");
        test_repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> GitCli {
        GitCli::new(self.dir.path())
    }

    pub fn config(&self) -> Config {
        Config::for_repo(self.dir.path())
    }

    /// Write a file relative to the working tree, creating parent directories.
    pub fn write(&self, path: &str, content: &str) {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(full, content).expect("Failed to write file");
    }

    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(path)).expect("Failed to read file")
    }

    pub fn remove(&self, path: &str) {
        std::fs::remove_file(self.dir.path().join(path)).expect("Failed to remove file");
    }

    /// Stage paths through libgit2.
    pub fn stage(&self, paths: &[&str]) {
        let mut index = self.repo.index().expect("Failed to get index");
        for path in paths {
            index.add_path(Path::new(path)).expect("Failed to add path");
        }
        index.write().expect("Failed to write index");
    }

    /// Stage everything in the working tree and commit it.
    pub fn commit_all(&self, message: &str) -> Oid {
        let mut index = self.repo.index().expect("Failed to get index");
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .expect("Failed to add all");
        index.write().expect("Failed to write index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");
        let sig = Signature::now("Test User", "test@example.com").expect("Failed to create signature");
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> usize {
        let mut walk = self.repo.revwalk().expect("Failed to create revwalk");
        if walk.push_head().is_err() {
            return 0;
        }
        walk.count()
    }

    /// Full message of the commit `n` steps before HEAD.
    pub fn message_at(&self, n: usize) -> String {
        let commit = self.commit_at(n);
        commit.message().unwrap_or("").to_string()
    }

    /// Paths changed by the commit `n` steps before HEAD, sorted.
    pub fn files_at(&self, n: usize) -> Vec<String> {
        let commit = self.commit_at(n);
        let tree = commit.tree().expect("Failed to get tree");
        let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
            .expect("Failed to diff commit");
        let mut paths: Vec<String> = diff
            .deltas()
            .filter_map(|d| {
                d.new_file()
                    .path()
                    .or_else(|| d.old_file().path())
                    .map(|p| p.to_string_lossy().to_string())
            })
            .collect();
        paths.sort();
        paths
    }

    /// Paths currently staged.
    pub fn staged(&self) -> Vec<String> {
        self.git().staged_paths().expect("Failed to list staged paths")
    }

    /// Install a hook script (unix only).
    #[cfg(unix)]
    pub fn install_hook(&self, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let hooks = self.dir.path().join(".git/hooks");
        std::fs::create_dir_all(&hooks).expect("Failed to create hooks dir");
        let path: PathBuf = hooks.join(name);
        std::fs::write(&path, script).expect("Failed to write hook");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod hook");
    }

    fn commit_at(&self, n: usize) -> git2::Commit<'_> {
        let mut commit = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .expect("Failed to resolve HEAD");
        for _ in 0..n {
            commit = commit.parent(0).expect("Failed to walk to parent");
        }
        commit
    }
}

/// Operator that answers from queues. An empty queue takes the prompt's default.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    pub confirms: VecDeque<bool>,
    pub decisions: VecDeque<Decision>,
    pub inputs: VecDeque<String>,
    /// Every prompt shown, in order.
    pub prompts: Vec<String>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirms(mut self, answers: &[bool]) -> Self {
        self.confirms.extend(answers.iter().copied());
        self
    }

    pub fn decisions(mut self, answers: &[Decision]) -> Self {
        self.decisions.extend(answers.iter().copied());
        self
    }

    pub fn inputs(mut self, answers: &[&str]) -> Self {
        self.inputs.extend(answers.iter().map(|s| s.to_string()));
        self
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool, WorkflowError> {
        self.prompts.push(prompt.to_string());
        Ok(self.confirms.pop_front().unwrap_or(default))
    }

    fn decide(&mut self, group: &Group, total: usize) -> Result<Decision, WorkflowError> {
        self.prompts.push(format!("decide GROUP {}/{}", group.index, total));
        Ok(self.decisions.pop_front().unwrap_or(Decision::DEFAULT))
    }

    fn input(&mut self, prompt: &str, default: &str) -> Result<String, WorkflowError> {
        self.prompts.push(prompt.to_string());
        let answer = self.inputs.pop_front().unwrap_or_default();
        if answer.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }
}

/// Completion service that replays canned responses and records requests.
#[derive(Debug, Default)]
pub struct CannedCompletion {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl CannedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, error: CompletionError) -> Self {
        self.responses.lock().expect("responses lock").push_back(Err(error));
        self
    }

    /// (prompt, system) pairs received so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl CompletionService for CannedCompletion {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, CompletionError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((prompt.to_string(), system.to_string()));
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Transport("no canned response left".to_string())))
    }
}

/// Build a grouping response from (type, scope, description, files).
pub fn grouping_response(groups: &[(&str, &str, &str, &[&str])]) -> String {
    let mut text = String::new();
    for (i, (ty, scope, description, files)) in groups.iter().enumerate() {
        if i > 0 {
            text.push('\n');
        }
        text.push_str(&format!(
            "GROUP {}: {ty}\nScope: {scope}\nDescription: {description}\nFiles:\n",
            i + 1
        ));
        for file in *files {
            text.push_str(&format!("- {file}\n"));
        }
    }
    text
}
