//! Git subprocess operations: index mutation, patch apply, and commit.
//!
//! All operations shell out to the system `git` binary, inheriting the
//! user's git config, hooks, and credential setup.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::error::GitError;

/// Runs git commands against one working tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Whether HEAD resolves to a commit.
    pub fn has_head(&self) -> bool {
        self.output(&["rev-parse", "--verify", "--quiet", "HEAD"], None, "verify HEAD")
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Unstage everything without touching the working tree.
    ///
    /// Resets the index to HEAD, or removes every index entry when the
    /// branch has no commits yet.
    pub fn reset_index(&self) -> Result<(), GitError> {
        if self.has_head() {
            self.run(&["reset", "--quiet", "HEAD"], "reset index")?;
        } else {
            self.run(
                &["rm", "-r", "--cached", "--quiet", "--ignore-unmatch", "--", "."],
                "clear index",
            )?;
        }
        Ok(())
    }

    /// `git add -A -- <paths>`; stages additions, modifications and deletions.
    pub fn add(&self, paths: &[&str]) -> Result<(), GitError> {
        let mut args = vec!["add", "-A", "--"];
        args.extend_from_slice(paths);
        self.run(&args, "add")?;
        Ok(())
    }

    /// Stage the removal of `path` from the index.
    pub fn remove_cached(&self, path: &str) -> Result<(), GitError> {
        self.run(&["rm", "--cached", "--quiet", "--", path], "rm --cached")?;
        Ok(())
    }

    /// Whether `path` is present in the index.
    pub fn is_tracked(&self, path: &str) -> Result<bool, GitError> {
        let stdout = self.run(&["ls-files", "--cached", "--", path], "ls-files")?;
        Ok(!stdout.trim().is_empty())
    }

    /// Whether the index differs from HEAD (or is non-empty without HEAD).
    pub fn has_staged_changes(&self) -> Result<bool, GitError> {
        if !self.has_head() {
            let stdout = self.run(&["ls-files", "--cached"], "ls-files")?;
            return Ok(!stdout.trim().is_empty());
        }

        let output = self.output(
            &["diff", "--cached", "--quiet", "--no-ext-diff"],
            None,
            "diff --cached",
        )?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(command_failed("diff --cached", &output)),
        }
    }

    /// Paths currently staged, in git's order.
    pub fn staged_paths(&self) -> Result<Vec<String>, GitError> {
        let stdout = if self.has_head() {
            self.run(
                &["diff", "--cached", "--name-only", "-z", "--no-renames"],
                "diff --cached --name-only",
            )?
        } else {
            self.run(&["ls-files", "--cached", "-z"], "ls-files")?
        };
        Ok(stdout
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect())
    }

    /// Full binary patch of the index against HEAD (or the empty tree).
    pub fn staged_patch(&self) -> Result<String, GitError> {
        if self.has_head() {
            self.run(
                &["diff", "--cached", "--binary", "--no-color", "--no-ext-diff"],
                "diff --cached --binary",
            )
        } else {
            let empty_tree = self
                .run(&["hash-object", "-t", "tree", "--stdin"], "hash empty tree")
                .map(|s| s.trim().to_string())?;
            self.run(
                &[
                    "diff",
                    "--cached",
                    "--binary",
                    "--no-color",
                    "--no-ext-diff",
                    &empty_tree,
                ],
                "diff --cached --binary",
            )
        }
    }

    /// Check whether `patch` applies to the index (optionally in reverse).
    pub fn apply_cached_check(&self, patch: &str, reverse: bool) -> Result<bool, GitError> {
        let mut args = vec!["apply", "--cached", "--check", "--whitespace=nowarn"];
        if reverse {
            args.push("--reverse");
        }
        let output = self.output(&args, Some(patch.as_bytes()), "apply --check")?;
        Ok(output.status.success())
    }

    /// Apply `patch` to the index only.
    pub fn apply_cached(&self, patch: &str) -> Result<(), GitError> {
        let output = self.output(
            &["apply", "--cached", "--whitespace=nowarn"],
            Some(patch.as_bytes()),
            "apply --cached",
        )?;
        if !output.status.success() {
            return Err(command_failed("apply --cached", &output));
        }
        Ok(())
    }

    /// Commit the index with a message read from a temporary file.
    ///
    /// Returns the short hash of the new commit.
    pub fn commit_with_message(&self, message: &str) -> Result<String, GitError> {
        let mut file = tempfile::Builder::new()
            .prefix("gitgroup-msg-")
            .suffix(".txt")
            .tempfile()
            .map_err(GitError::MessageFile)?;
        file.write_all(message.as_bytes())
            .and_then(|_| file.flush())
            .map_err(GitError::MessageFile)?;

        let path = file.path().to_string_lossy().to_string();
        self.run(&["commit", "--quiet", "--cleanup=whitespace", "-F", &path], "commit")?;

        let hash = self.run(&["rev-parse", "--short", "HEAD"], "rev-parse HEAD")?;
        Ok(hash.trim().to_string())
    }

    /// Run a git command and return stdout, or a descriptive error.
    pub fn run(&self, args: &[&str], operation: &str) -> Result<String, GitError> {
        let output = self.output(args, None, operation)?;
        if !output.status.success() {
            return Err(command_failed(operation, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn output(
        &self,
        args: &[&str],
        stdin: Option<&[u8]>,
        operation: &str,
    ) -> Result<Output, GitError> {
        debug!(workdir = %self.workdir.display(), ?args, "git");

        let mut command = Command::new("git");
        command
            .arg("-C")
            .arg(&self.workdir)
            .args(args)
            .env("GIT_LITERAL_PATHSPECS", "1")
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawn_err = |source| GitError::SpawnFailed {
            operation: operation.to_string(),
            source,
        };

        let mut child = command.spawn().map_err(spawn_err)?;
        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input).map_err(spawn_err)?;
        }
        child.wait_with_output().map_err(spawn_err)
    }
}

fn command_failed(operation: &str, output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stderr = if stderr.is_empty() {
        format!(
            "exited with {}",
            output
                .status
                .code()
                .map_or("signal".to_string(), |c| format!("code {c}"))
        )
    } else {
        stderr
    };
    GitError::CommandFailed {
        operation: operation.to_string(),
        stderr,
    }
}
