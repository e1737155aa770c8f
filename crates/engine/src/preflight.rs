// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup preflight checks.
//!
//! `validate` runs these read-only; `start` refuses to boot on a blocking
//! failure. The Anthropic-auth check is a warning only; the agent SDK may
//! inherit auth from a subscription login.

use crate::prompts;
use ap_adapters::subprocess::{capture_stdout, GIT_TIMEOUT};
use ap_adapters::{CodeHost, Tracker};
use ap_core::{sanitize, Config, TicketRef};
use std::path::Path;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct PreflightCheck {
    pub name: &'static str,
    pub ok: bool,
    /// Blocking failures prevent `start`; warnings do not.
    pub blocking: bool,
    pub detail: String,
}

impl PreflightCheck {
    fn ok(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            blocking: true,
            detail: detail.into(),
        }
    }

    fn failed(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            blocking: true,
            detail: detail.into(),
        }
    }

    fn warning(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            blocking: false,
            detail: detail.into(),
        }
    }
}

/// True when any blocking check failed.
pub fn has_blocking_failure(checks: &[PreflightCheck]) -> bool {
    checks.iter().any(|check| !check.ok && check.blocking)
}

/// Resolve the `owner/repo` slug: explicit config first, then the git
/// remote.
pub fn repo_slug(config: &Config, remote_url: Option<&str>) -> Option<(String, String)> {
    if !config.github.repo.is_empty() {
        return split_slug(&config.github.repo);
    }
    remote_url.and_then(parse_remote_url)
}

fn split_slug(slug: &str) -> Option<(String, String)> {
    let (owner, repo) = slug.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

/// Parse `git@github.com:owner/repo.git` and
/// `https://github.com/owner/repo(.git)` remote URLs.
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    split_slug(rest.trim_end_matches('/').trim_end_matches(".git"))
}

/// Resolve the repository slug for a project, consulting the git remote.
pub async fn project_repo_slug(config: &Config, project_path: &Path) -> Option<(String, String)> {
    let remote_url = git_remote_url(project_path).await;
    repo_slug(config, remote_url.as_deref())
}

/// Run every preflight check. Pass `None` for a collaborator whose
/// credentials are missing; the corresponding check fails.
pub async fn run_preflight<T: Tracker, H: CodeHost>(
    config: &Config,
    project_path: &Path,
    tracker: Option<&T>,
    codehost: Option<&H>,
) -> Vec<PreflightCheck> {
    let mut checks = Vec::new();

    checks.push(match config.validate() {
        Ok(()) => PreflightCheck::ok("config", "configuration valid"),
        Err(err) => PreflightCheck::failed("config", err.to_string()),
    });

    checks.push(check_git_repo(project_path).await);
    let remote_url = git_remote_url(project_path).await;
    checks.push(check_remote(config, remote_url.as_deref()));
    checks.push(check_clone_base(project_path).await);

    checks.push(match tracker {
        Some(tracker) => match tracker.ping().await {
            Ok(()) => PreflightCheck::ok("tracker", "issue tracker reachable"),
            Err(err) => {
                PreflightCheck::failed("tracker", sanitize(&format!("unreachable: {err}")))
            }
        },
        None => PreflightCheck::failed("tracker", "no tracker credentials configured"),
    });

    checks.push(match codehost {
        Some(codehost) => match codehost.ping().await {
            Ok(()) => PreflightCheck::ok("code-host", "code host reachable"),
            Err(err) => {
                PreflightCheck::failed("code-host", sanitize(&format!("unreachable: {err}")))
            }
        },
        None => PreflightCheck::warning("code-host", "no code-host token; monitor disabled"),
    });

    let has_provider_auth = ["ANTHROPIC_API_KEY", "CLAUDE_CODE_OAUTH_TOKEN"]
        .iter()
        .any(|key| std::env::var(key).is_ok_and(|value| !value.is_empty()));
    checks.push(if has_provider_auth {
        PreflightCheck::ok("anthropic-auth", "provider credentials in environment")
    } else {
        PreflightCheck::warning(
            "anthropic-auth",
            "no provider key in environment; the agent SDK may still inherit subscription auth",
        )
    });

    checks.push(check_prompts(config));
    checks
}

async fn check_git_repo(project_path: &Path) -> PreflightCheck {
    let mut cmd = Command::new("git");
    cmd.current_dir(project_path);
    cmd.args(["rev-parse", "--git-dir"]);
    match capture_stdout(cmd, GIT_TIMEOUT, "git rev-parse").await {
        Some(_) => PreflightCheck::ok("git-repo", "project is a git repository"),
        None => PreflightCheck::failed(
            "git-repo",
            format!("{} is not a git repository", project_path.display()),
        ),
    }
}

async fn git_remote_url(project_path: &Path) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.current_dir(project_path);
    cmd.args(["remote", "get-url", "origin"]);
    capture_stdout(cmd, GIT_TIMEOUT, "git remote get-url").await
}

fn check_remote(config: &Config, remote_url: Option<&str>) -> PreflightCheck {
    match repo_slug(config, remote_url) {
        Some((owner, repo)) => {
            PreflightCheck::ok("git-remote", format!("monitoring {owner}/{repo}"))
        }
        None => match remote_url {
            Some(url) => PreflightCheck::failed(
                "git-remote",
                format!("origin remote not parseable as owner/repo: {url}"),
            ),
            None => PreflightCheck::warning(
                "git-remote",
                "no origin remote and no github.repo override; monitor disabled",
            ),
        },
    }
}

async fn check_clone_base(project_path: &Path) -> PreflightCheck {
    let clones = project_path.join(".claude/clones");
    if let Err(err) = tokio::fs::create_dir_all(&clones).await {
        return PreflightCheck::failed(
            "clone-base",
            format!("cannot create {}: {err}", clones.display()),
        );
    }
    let probe = clones.join(".preflight");
    match tokio::fs::write(&probe, b"ok").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            PreflightCheck::ok("clone-base", "clone directory writable")
        }
        Err(err) => PreflightCheck::failed(
            "clone-base",
            format!("{} not writable: {err}", clones.display()),
        ),
    }
}

fn check_prompts(config: &Config) -> PreflightCheck {
    let sample = TicketRef {
        id: "preflight".into(),
        identifier: "ENG-0".into(),
        title: "Preflight sample".into(),
        priority: 0,
        created_at_ms: 0,
    };
    let rendered = prompts::executor_prompt(&sample, config);
    if rendered.contains("ENG-0") && !rendered.is_empty() {
        PreflightCheck::ok("prompts", "prompt templates render")
    } else {
        PreflightCheck::failed("prompts", "executor prompt did not render the ticket")
    }
}

#[cfg(test)]
#[path = "preflight_tests.rs"]
mod tests;
