// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GitHub REST client implementing the [`CodeHost`] contract.

use crate::codehost::{aggregate_ci, CheckRun, CodeHost, PrStatus};
use crate::error::{error_for_status, parse_retry_after, RemoteError};
use ap_core::truncate_summary;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

const API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("autopilot/", env!("CARGO_PKG_VERSION"));

const ENABLE_AUTO_MERGE_MUTATION: &str = "mutation Automerge($id: ID!) {
  enablePullRequestAutoMerge(input: { pullRequestId: $id, mergeMethod: SQUASH }) {
    pullRequest { number }
  }
}";

pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_url(API_URL, token)
    }

    /// Alternate endpoint for GitHub Enterprise or tests.
    pub fn with_api_url(api_url: &str, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value, RemoteError> {
        let response = self
            .http
            .get(format!("{}{path}", self.api_url))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, RemoteError> {
        let response = self
            .http
            .post(format!("{}/graphql", self.api_url))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let body = Self::decode(response).await?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|err| err["message"].as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(RemoteError::other(format!("github api error: {message}")));
            }
        }
        Ok(body)
    }

    async fn decode(response: reqwest::Response) -> Result<Value, RemoteError> {
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_retry_after(value, epoch_ms_now()));
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, retry_after, &truncate_summary(&body)));
        }
        response
            .json()
            .await
            .map_err(|err| RemoteError::other(format!("invalid github response: {err}")))
    }
}

fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Parse the check-runs listing into [`CheckRun`]s.
pub(crate) fn parse_check_runs(data: &Value) -> Vec<CheckRun> {
    data["check_runs"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|node| {
            Some(CheckRun {
                name: node["name"].as_str()?.to_string(),
                status: node["status"].as_str().unwrap_or("completed").to_string(),
                conclusion: node["conclusion"].as_str().map(String::from),
            })
        })
        .collect()
}

/// Newest review id from the reviews listing, if any.
pub(crate) fn latest_review_id(reviews: &Value) -> Option<String> {
    reviews
        .as_array()?
        .iter()
        .filter_map(|review| review["id"].as_u64())
        .max()
        .map(|id| id.to_string())
}

#[async_trait]
impl CodeHost for GitHubClient {
    async fn pr_status(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PrStatus, RemoteError> {
        let pr = self.get(&format!("/repos/{owner}/{repo}/pulls/{number}")).await?;
        let head_sha = pr["head"]["sha"].as_str().unwrap_or_default().to_string();
        let branch = pr["head"]["ref"].as_str().unwrap_or_default().to_string();
        let merged = pr["merged"].as_bool().unwrap_or(false);
        let mergeable = pr["mergeable"].as_bool();

        let checks = if head_sha.is_empty() {
            Vec::new()
        } else {
            let listing = self
                .get(&format!("/repos/{owner}/{repo}/commits/{head_sha}/check-runs"))
                .await?;
            parse_check_runs(&listing)
        };
        let (ci_status, ci_details) = aggregate_ci(&checks);

        let reviews = self
            .get(&format!("/repos/{owner}/{repo}/pulls/{number}/reviews"))
            .await?;

        Ok(PrStatus {
            number,
            merged,
            mergeable,
            branch,
            head_sha,
            ci_status,
            ci_details,
            latest_review_id: latest_review_id(&reviews),
        })
    }

    async fn enable_auto_merge(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<(), RemoteError> {
        let pr = self.get(&format!("/repos/{owner}/{repo}/pulls/{number}")).await?;
        let node_id = pr["node_id"]
            .as_str()
            .ok_or_else(|| RemoteError::other("pull request has no node id"))?;
        self.graphql(ENABLE_AUTO_MERGE_MUTATION, json!({ "id": node_id }))
            .await
            .map(|_| ())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.get("/rate_limit").await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
