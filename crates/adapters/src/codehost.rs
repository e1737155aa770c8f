// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The code-host contract: pull-request status and CI aggregation.

use crate::error::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Aggregated CI verdict for a PR head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    Success,
    Failure,
    Pending,
}

/// One check run as reported by the code host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRun {
    pub name: String,
    /// `queued`, `in_progress`, or `completed`.
    pub status: String,
    /// Present once completed: `success`, `failure`, `timed_out`, …
    pub conclusion: Option<String>,
}

/// Status of one pull request, as the monitor consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PrStatus {
    pub number: u64,
    pub merged: bool,
    /// `None` while the host is still computing mergeability.
    pub mergeable: Option<bool>,
    /// Head branch name.
    pub branch: String,
    pub head_sha: String,
    pub ci_status: CiStatus,
    /// Names of failing checks.
    pub ci_details: Vec<String>,
    /// Id of the newest review, if any. Changes identify a new review cycle.
    pub latest_review_id: Option<String>,
}

/// Narrow view of the code-hosting service.
#[async_trait]
pub trait CodeHost: Send + Sync + 'static {
    async fn pr_status(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PrStatus, RemoteError>;

    /// Enable auto-merge for a PR. Safe to call more than once.
    async fn enable_auto_merge(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<(), RemoteError>;

    /// Cheap reachability probe for preflight.
    async fn ping(&self) -> Result<(), RemoteError>;
}

/// Fold check runs into one verdict: any failed or timed-out check fails
/// the PR; otherwise any incomplete check keeps it pending; otherwise
/// success. Returns the failing check names alongside.
pub fn aggregate_ci(checks: &[CheckRun]) -> (CiStatus, Vec<String>) {
    let failing: Vec<String> = checks
        .iter()
        .filter(|check| {
            matches!(check.conclusion.as_deref(), Some("failure") | Some("timed_out"))
        })
        .map(|check| check.name.clone())
        .collect();
    if !failing.is_empty() {
        return (CiStatus::Failure, failing);
    }
    if checks.iter().any(|check| check.status != "completed") {
        return (CiStatus::Pending, Vec::new());
    }
    (CiStatus::Success, Vec::new())
}

/// Parse a GitHub pull-request URL into `(owner, repo, number)`.
pub fn parse_pr_url(url: &str) -> Option<(String, String, u64)> {
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    let mut parts = rest.split('/');
    let owner = parts.next()?.to_string();
    let repo = parts.next()?.to_string();
    if parts.next()? != "pull" {
        return None;
    }
    let number: u64 = parts.next()?.split(['#', '?']).next()?.parse().ok()?;
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner, repo, number))
}

#[cfg(test)]
#[path = "codehost_tests.rs"]
mod tests;
