//! Version-control adapter.
//!
//! A narrow surface over the `git` binary: status, staged commit, recent
//! history, reset, revert. Every command runs under a bounded timeout so a
//! hung git process (lock contention, credential prompt) can never stall
//! the scheduler or its shutdown signal. The scheduler never proceeds
//! silently past a VCS failure.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Default cap on any single git command.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// Working-tree status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitStatus {
    pub clean: bool,
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    pub head: Option<String>,
}

impl GitStatus {
    pub fn has_changes(&self) -> bool {
        !self.clean
    }
}

/// Git operations scoped to one project root.
#[derive(Debug, Clone)]
pub struct GitManager {
    root: PathBuf,
    timeout: Duration,
}

impl GitManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run git with the configured timeout. The child is killed when the
    /// deadline passes. Nonzero exits are returned, not errors.
    async fn raw(&self, args: &[&str]) -> Result<Output, VcsError> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(VcsError::Timeout {
                command: args.join(" "),
                timeout: self.timeout,
            }),
        }
    }

    /// Like [`raw`], but a nonzero exit is an error.
    async fn run(&self, args: &[&str]) -> Result<Output, VcsError> {
        let output = self.raw(args).await?;
        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    pub async fn is_repo(&self) -> bool {
        self.raw(&["rev-parse", "--git-dir"])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub async fn init_repo(&self) -> Result<(), VcsError> {
        self.run(&["init"]).await?;
        Ok(())
    }

    /// Porcelain status plus HEAD.
    pub async fn status(&self) -> Result<GitStatus, VcsError> {
        if !self.is_repo().await {
            return Err(VcsError::NotARepo(self.root.clone()));
        }
        let output = self.run(&["status", "--porcelain"]).await?;
        let text = String::from_utf8_lossy(&output.stdout);

        let mut modified = Vec::new();
        let mut untracked = Vec::new();
        for line in text.lines() {
            if line.len() < 4 {
                continue;
            }
            let (code, path) = line.split_at(3);
            if code.starts_with("??") {
                untracked.push(path.trim().to_string());
            } else {
                modified.push(path.trim().to_string());
            }
        }

        Ok(GitStatus {
            clean: modified.is_empty() && untracked.is_empty(),
            modified,
            untracked,
            head: self.head_commit().await?,
        })
    }

    /// Current HEAD hash, or `None` before the first commit.
    pub async fn head_commit(&self) -> Result<Option<String>, VcsError> {
        let output = self.raw(&["rev-parse", "HEAD"]).await?;
        if !output.status.success() {
            // An unborn branch is not an error here.
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    /// Stage everything under the root and commit. Returns the new hash, or
    /// `None` when there was nothing to commit.
    pub async fn commit_all(&self, message: &str) -> Result<Option<String>, VcsError> {
        self.run(&["add", "-A"]).await?;

        let staged = self.raw(&["diff", "--cached", "--quiet"]).await?;
        if staged.status.success() {
            return Ok(None);
        }

        self.run(&["commit", "-m", message]).await?;
        self.head_commit().await
    }

    /// Recent commits as `(hash, subject)`, newest first.
    pub async fn recent_commits(&self, count: usize) -> Result<Vec<(String, String)>, VcsError> {
        let arg = format!("-{count}");
        let output = match self.run(&["log", &arg, "--format=%H %s"]).await {
            Ok(o) => o,
            // No commits yet.
            Err(VcsError::CommandFailed { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .filter_map(|line| {
                let (hash, subject) = line.split_once(' ')?;
                Some((hash.to_string(), subject.to_string()))
            })
            .collect())
    }

    pub async fn reset(&self, commit: &str, hard: bool) -> Result<(), VcsError> {
        if hard {
            self.run(&["reset", "--hard", commit]).await?;
        } else {
            self.run(&["reset", commit]).await?;
        }
        Ok(())
    }

    pub async fn revert(&self, commit: &str) -> Result<(), VcsError> {
        self.run(&["revert", "--no-edit", commit]).await?;
        Ok(())
    }

    /// Paths changed since a commit, or the full dirty set when `None`.
    pub async fn changed_files(&self, since: Option<&str>) -> Result<Vec<String>, VcsError> {
        match since {
            Some(commit) => {
                let range = format!("{commit}..HEAD");
                let output = self.run(&["diff", "--name-only", &range]).await?;
                let mut files: Vec<String> = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                // Uncommitted edits count too.
                let status = self.status().await?;
                for path in status.modified.into_iter().chain(status.untracked) {
                    if !files.contains(&path) {
                        files.push(path);
                    }
                }
                Ok(files)
            }
            None => {
                let status = self.status().await?;
                let mut files = status.modified;
                files.extend(status.untracked);
                Ok(files)
            }
        }
    }
}
