// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox clone manager.
//!
//! Every agent works in a fresh `git clone --shared` of the project under
//! `<project>/.claude/clones/<name>`. Shared clones reuse the parent's
//! object store via alternates, so creation copies no objects. Names carry
//! the `ap-` prefix; the sweeper only ever touches that namespace, which
//! keeps human-made clones safe.

use ap_adapters::subprocess::{capture_stdout, run_with_timeout, SubprocessError, GIT_TIMEOUT};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Namespace prefix for orchestrator-owned clone directories.
pub const CLONE_PREFIX: &str = "ap-";

/// Branches created for executor runs.
const BRANCH_PREFIX: &str = "autopilot-";

/// Branch prefix from the old worktree-based layout; still checked out
/// when present on the remote so long-lived tickets migrate cleanly.
const LEGACY_BRANCH_PREFIX: &str = "worktree-";

/// Sleeps between removal attempts (four attempts total).
const REMOVE_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

#[derive(Debug, Error)]
pub enum CloneError {
    #[error("invalid clone name: {0:?}")]
    InvalidName(String),
    #[error("stale clone directory could not be removed: {0}")]
    StaleDir(String),
    #[error("git {op} failed: {detail}")]
    Git { op: &'static str, detail: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
}

/// A created clone: where it is and which branch is checked out.
#[derive(Debug, Clone, PartialEq)]
pub struct CloneCheckout {
    pub path: PathBuf,
    pub branch: String,
}

/// Derive a clone name from a ticket identifier: `ENG-12` → `ap-eng-12`.
pub fn clone_name_for(identifier: &str) -> String {
    let slug: String = identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    format!("{CLONE_PREFIX}{}", slug.trim_matches('-'))
}

pub struct CloneManager {
    project_path: PathBuf,
    git_name: Option<String>,
    git_email: Option<String>,
}

impl CloneManager {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
            git_name: None,
            git_email: None,
        }
    }

    /// Set a local committer identity inside every clone.
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.git_name = Some(name.into());
        self.git_email = Some(email.into());
        self
    }

    pub fn clones_dir(&self) -> PathBuf {
        self.project_path.join(".claude/clones")
    }

    fn legacy_worktrees_dir(&self) -> PathBuf {
        self.project_path.join(".claude/worktrees")
    }

    /// Validate a name and resolve its directory. The result is always a
    /// strict child of the clones dir: names with separators or traversal
    /// components are rejected outright.
    fn clone_path(&self, name: &str) -> Result<PathBuf, CloneError> {
        let valid = !name.is_empty()
            && name.starts_with(CLONE_PREFIX)
            && !name.contains('/')
            && !name.contains('\\')
            && !name.contains("..");
        if !valid {
            return Err(CloneError::InvalidName(name.to_string()));
        }
        let path = self.clones_dir().join(name);
        if path.parent() != Some(self.clones_dir().as_path()) {
            return Err(CloneError::InvalidName(name.to_string()));
        }
        Ok(path)
    }

    /// Create an isolated clone and check out the working branch.
    ///
    /// `from_branch` is the fixer path: check out an existing PR branch
    /// instead of cutting a new one.
    pub async fn create_clone(
        &self,
        name: &str,
        from_branch: Option<&str>,
    ) -> Result<CloneCheckout, CloneError> {
        tokio::fs::create_dir_all(self.clones_dir()).await?;
        let dest = self.clone_path(name)?;

        if dest.exists() {
            self.remove_clone(name, true).await;
            if dest.exists() {
                return Err(CloneError::StaleDir(dest.display().to_string()));
            }
        }

        let default_branch = self.default_branch().await;
        self.run_git(
            "clone",
            &self.project_path,
            &[
                "clone",
                "--shared",
                "--no-tags",
                "--branch",
                &default_branch,
                &self.project_path.display().to_string(),
                &dest.display().to_string(),
            ],
        )
        .await?;

        // Point origin at the real remote so the agent can push.
        if let Some(remote_url) = self.remote_url().await {
            self.run_git("remote set-url", &dest, &["remote", "set-url", "origin", &remote_url])
                .await?;
        }

        if let (Some(name), Some(email)) = (&self.git_name, &self.git_email) {
            self.run_git("config user.name", &dest, &["config", "user.name", name]).await?;
            self.run_git("config user.email", &dest, &["config", "user.email", email]).await?;
        }

        // Populate remote-tracking refs. Soft failure: offline clones can
        // still run against the shared object store.
        if let Err(err) = self.run_git("fetch", &dest, &["fetch", "origin"]).await {
            tracing::warn!(clone = name, error = %err, "git fetch failed, remote refs stale");
        }

        if let Some(branch) = from_branch {
            self.run_git("checkout", &dest, &["checkout", branch]).await?;
            return Ok(CloneCheckout {
                path: dest,
                branch: branch.to_string(),
            });
        }

        let bare_name = name.strip_prefix(CLONE_PREFIX).unwrap_or(name);
        let legacy_branch = format!("{LEGACY_BRANCH_PREFIX}{bare_name}");
        if self.remote_branch_exists(&dest, &legacy_branch).await {
            self.run_git("checkout", &dest, &["checkout", &legacy_branch]).await?;
            return Ok(CloneCheckout {
                path: dest,
                branch: legacy_branch,
            });
        }

        let branch = format!("{BRANCH_PREFIX}{bare_name}");
        self.run_git(
            "checkout -b",
            &dest,
            &["checkout", "-b", &branch, &default_branch],
        )
        .await?;
        Ok(CloneCheckout { path: dest, branch })
    }

    /// Best-effort removal with retries (1/3/5 s between attempts).
    /// Never fails; a stuck directory is left for the next sweep.
    pub async fn remove_clone(&self, name: &str, keep_branch: bool) {
        let Ok(path) = self.clone_path(name) else {
            return;
        };
        for delay in REMOVE_RETRY_DELAYS
            .iter()
            .map(Some)
            .chain(std::iter::once(None))
        {
            if !path.exists() {
                break;
            }
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => break,
                Err(err) if !path.exists() => {
                    tracing::debug!(clone = name, error = %err, "clone vanished during removal");
                    break;
                }
                Err(err) => {
                    tracing::warn!(clone = name, error = %err, "clone removal failed");
                    match delay {
                        Some(delay) => tokio::time::sleep(*delay).await,
                        None => return,
                    }
                }
            }
        }

        if !keep_branch {
            // Migration leftovers: the old layout kept branches in the
            // parent repository.
            let bare_name = name.strip_prefix(CLONE_PREFIX).unwrap_or(name);
            for branch in [
                format!("{BRANCH_PREFIX}{bare_name}"),
                format!("{LEGACY_BRANCH_PREFIX}{bare_name}"),
            ] {
                let _ = self
                    .run_git("branch -D", &self.project_path, &["branch", "-D", &branch])
                    .await;
            }
        }
    }

    /// Remove every `ap-` clone not named in `active`, plus anything left
    /// in the legacy worktrees directory. A missing clones dir is fine.
    pub async fn sweep_clones(&self, active: &HashSet<String>) {
        if let Ok(mut entries) = tokio::fs::read_dir(self.clones_dir()).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name.starts_with(CLONE_PREFIX) && !active.contains(name) {
                    tracing::info!(clone = name, "sweeping stale clone");
                    self.remove_clone(name, false).await;
                }
            }
        }

        let legacy = self.legacy_worktrees_dir();
        if let Ok(mut entries) = tokio::fs::read_dir(&legacy).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                tracing::info!(path = %entry.path().display(), "sweeping legacy worktree");
                let _ = tokio::fs::remove_dir_all(entry.path()).await;
            }
            let _ = tokio::fs::remove_dir(&legacy).await;
        }
    }

    /// The parent's default branch via remote HEAD, falling back to `main`.
    async fn default_branch(&self) -> String {
        let mut cmd = self.git_command(&self.project_path);
        cmd.args(["symbolic-ref", "refs/remotes/origin/HEAD"]);
        if let Some(head) = capture_stdout(cmd, GIT_TIMEOUT, "git symbolic-ref").await {
            if let Some(branch) = head.strip_prefix("refs/remotes/origin/") {
                if !branch.is_empty() {
                    return branch.to_string();
                }
            }
        }
        // local HEAD as a second guess before the hard fallback
        let mut cmd = self.git_command(&self.project_path);
        cmd.args(["symbolic-ref", "--short", "HEAD"]);
        capture_stdout(cmd, GIT_TIMEOUT, "git symbolic-ref --short")
            .await
            .filter(|branch| !branch.is_empty())
            .unwrap_or_else(|| "main".to_string())
    }

    async fn remote_url(&self) -> Option<String> {
        let mut cmd = self.git_command(&self.project_path);
        cmd.args(["remote", "get-url", "origin"]);
        capture_stdout(cmd, GIT_TIMEOUT, "git remote get-url").await
    }

    async fn remote_branch_exists(&self, clone: &Path, branch: &str) -> bool {
        let mut cmd = self.git_command(clone);
        cmd.args([
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/remotes/origin/{branch}"),
        ]);
        capture_stdout(cmd, GIT_TIMEOUT, "git rev-parse").await.is_some()
    }

    fn git_command(&self, cwd: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(cwd);
        cmd.env_remove("GIT_DIR");
        cmd.env_remove("GIT_WORK_TREE");
        cmd
    }

    async fn run_git(
        &self,
        op: &'static str,
        cwd: &Path,
        args: &[&str],
    ) -> Result<(), CloneError> {
        let mut cmd = self.git_command(cwd);
        cmd.args(args);
        let output = run_with_timeout(cmd, GIT_TIMEOUT, op).await?;
        if !output.status.success() {
            return Err(CloneError::Git {
                op,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "clones_tests.rs"]
mod tests;
