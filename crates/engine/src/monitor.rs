// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitor: watch in-review tickets' pull requests and react to CI.
//!
//! Merged PRs move their ticket to done. Failing CI spawns a fixer agent on
//! the PR branch: at most one per ticket at a time, and at most one per
//! review cycle (a cycle is identified by the newest review id, falling
//! back to the head SHA, so a new push or review re-arms the fixer).

use crate::breaker::BreakerRegistry;
use crate::clones::clone_name_for;
use crate::error::EngineError;
use crate::executor::some_model;
use crate::prompts;
use crate::retry::{with_retry, RetryOptions};
use crate::runner::{AgentRunSpec, AgentRunner, RunnerOptions};
use crate::state::AppState;
use ap_adapters::{parse_pr_url, AgentSdk, CiStatus, CodeHost, PrStatus, Tracker};
use ap_core::{sanitize, AgentStatus, Clock, Config, RunId, RunType, TicketRef, WorkflowState};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Monitor<T, H, K, C: Clock> {
    tracker: Arc<T>,
    codehost: Arc<H>,
    runner: Arc<AgentRunner<K, C>>,
    state: Arc<AppState<C>>,
    breakers: Arc<BreakerRegistry>,
    clock: C,
    project_path: PathBuf,
    /// Ticket identifiers with a live fixer.
    fixing: Mutex<HashSet<String>>,
    /// Review cycles already handled; never re-triggered.
    handled_cycles: Mutex<HashSet<String>>,
    /// PRs where auto-merge was already enabled.
    automerged: Mutex<HashSet<String>>,
    /// Fixer spawns per ticket, bounded by `max_fixer_attempts`.
    fixer_attempts: Mutex<HashMap<String, u32>>,
}

impl<T, H, K, C> Monitor<T, H, K, C>
where
    T: Tracker,
    H: CodeHost,
    K: AgentSdk,
    C: Clock,
{
    pub fn new(
        tracker: Arc<T>,
        codehost: Arc<H>,
        runner: Arc<AgentRunner<K, C>>,
        state: Arc<AppState<C>>,
        breakers: Arc<BreakerRegistry>,
        clock: C,
        project_path: PathBuf,
    ) -> Self {
        Self {
            tracker,
            codehost,
            runner,
            state,
            breakers,
            clock,
            project_path,
            fixing: Mutex::new(HashSet::new()),
            handled_cycles: Mutex::new(HashSet::new()),
            automerged: Mutex::new(HashSet::new()),
            fixer_attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Inspect every in-review ticket's PR. Returns in-flight fixer
    /// handles; everything else is handled inline.
    pub async fn check_open_prs(
        self: &Arc<Self>,
        owner: &str,
        repo: &str,
        config: &Config,
        root: Option<&CancellationToken>,
    ) -> Vec<JoinHandle<bool>> {
        let tracker = Arc::clone(&self.tracker);
        let reviews = match with_retry(
            &self.breakers,
            &self.clock,
            "tracker.in_review_tickets",
            RetryOptions::default(),
            move || {
                let tracker = Arc::clone(&tracker);
                async move { tracker.in_review_tickets().await }
            },
        )
        .await
        {
            Ok(reviews) => reviews,
            Err(err) => {
                tracing::warn!(error = %sanitize(&err.to_string()), "in-review poll failed");
                return Vec::new();
            }
        };

        let mut handles = Vec::new();
        for review in reviews {
            let Some((_, _, number)) = review
                .pr_urls
                .iter()
                .find_map(|url| parse_pr_url(url))
                .filter(|(pr_owner, pr_repo, _)| pr_owner == owner && pr_repo == repo)
            else {
                continue;
            };

            let pr = match self.pr_status(owner, repo, number).await {
                Ok(pr) => pr,
                Err(err) => {
                    tracing::warn!(
                        ticket = %review.ticket.identifier,
                        pr = number,
                        error = %sanitize(&err.to_string()),
                        "pull request status fetch failed"
                    );
                    continue;
                }
            };

            if pr.merged {
                // idempotent: moving an already-done ticket again is safe
                if let Err(err) = self
                    .move_ticket(&review.ticket.id, WorkflowState::Done)
                    .await
                {
                    tracing::error!(
                        ticket = %review.ticket.identifier,
                        error = %sanitize(&err.to_string()),
                        "merged PR but ticket could not move to done"
                    );
                } else {
                    tracing::info!(ticket = %review.ticket.identifier, pr = number, "PR merged, ticket done");
                }
                continue;
            }

            match pr.ci_status {
                CiStatus::Pending => {}
                CiStatus::Success => {
                    if config.github.automerge {
                        self.maybe_enable_automerge(owner, repo, number).await;
                    }
                }
                CiStatus::Failure => {
                    if let Some(handle) =
                        self.maybe_spawn_fixer(owner, repo, review.ticket, pr, config, root)
                    {
                        handles.push(handle);
                    }
                }
            }
        }
        handles
    }

    fn maybe_spawn_fixer(
        self: &Arc<Self>,
        owner: &str,
        repo: &str,
        ticket: TicketRef,
        pr: PrStatus,
        config: &Config,
        root: Option<&CancellationToken>,
    ) -> Option<JoinHandle<bool>> {
        if self.fixing.lock().contains(&ticket.identifier) {
            return None;
        }

        let cycle = format!(
            "{owner}/{repo}#{}@{}",
            pr.number,
            pr.latest_review_id.clone().unwrap_or_else(|| pr.head_sha.clone())
        );
        if !self.handled_cycles.lock().insert(cycle) {
            tracing::debug!(ticket = %ticket.identifier, pr = pr.number, "review cycle already handled");
            return None;
        }

        let attempts = {
            let mut attempts = self.fixer_attempts.lock();
            let count = attempts.entry(ticket.identifier.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if attempts > config.executor.max_fixer_attempts {
            tracing::warn!(
                ticket = %ticket.identifier,
                attempts,
                "fixer attempts exhausted, leaving CI red for a human"
            );
            return None;
        }

        tracing::info!(
            ticket = %ticket.identifier,
            pr = pr.number,
            failing = ?pr.ci_details,
            "CI failed, dispatching fixer"
        );
        self.fixing.lock().insert(ticket.identifier.clone());
        let monitor = Arc::clone(self);
        let config = config.clone();
        let root = root.cloned();
        Some(tokio::spawn(async move {
            let identifier = ticket.identifier.clone();
            let done = monitor.run_fixer(ticket, pr, &config, root).await;
            monitor.fixing.lock().remove(&identifier);
            done
        }))
    }

    /// Run one fixer agent on the PR branch. No tracker transition: the
    /// fixer only pushes and lets CI re-run.
    async fn run_fixer(
        &self,
        ticket: TicketRef,
        pr: PrStatus,
        config: &Config,
        root: Option<CancellationToken>,
    ) -> bool {
        let run_id = RunId::generate();
        if !self.state.add_agent(
            run_id.clone(),
            &ticket.identifier,
            &ticket.title,
            Some(ticket.id.clone()),
        ) {
            return false;
        }
        let token = match &root {
            Some(root) => root.child_token(),
            None => CancellationToken::new(),
        };
        self.state.register_controller(run_id.clone(), token.clone());

        let spec = AgentRunSpec {
            prompt: prompts::fixer_prompt(&ticket, &pr.branch, &pr.ci_details, config),
            working_dir: self.project_path.clone(),
            clone_name: Some(format!("{}-fix", clone_name_for(&ticket.identifier))),
            from_branch: Some(pr.branch.clone()),
            options: RunnerOptions {
                timeout_ms: u64::from(config.executor.fixer_timeout_minutes) * 60_000,
                inactivity_ms: u64::from(config.executor.inactivity_timeout_minutes) * 60_000,
                model: some_model(&config.executor.model),
                mcp_servers: None,
                agents: None,
                parent: Some(token),
            },
        };

        let state = Arc::clone(&self.state);
        let activity_run_id = run_id.clone();
        let output = self
            .runner
            .run(spec, move |activity| {
                state.add_activity(&activity_run_id, activity)
            })
            .await;

        let status = output.status();
        self.state.complete_agent(
            &run_id,
            status,
            output.meta(RunType::Fixer),
            Some(&output.messages),
        );

        match status {
            AgentStatus::Completed => {
                tracing::info!(ticket = %ticket.identifier, pr = pr.number, "fixer pushed, CI re-running");
                true
            }
            _ => {
                tracing::warn!(
                    ticket = %ticket.identifier,
                    pr = pr.number,
                    status = %status,
                    "fixer did not complete"
                );
                false
            }
        }
    }

    /// Enable auto-merge once per PR; repeated green polls do nothing.
    async fn maybe_enable_automerge(&self, owner: &str, repo: &str, number: u64) {
        let key = format!("{owner}/{repo}#{number}");
        if !self.automerged.lock().insert(key) {
            return;
        }
        let codehost = Arc::clone(&self.codehost);
        let owner = owner.to_string();
        let repo = repo.to_string();
        let result = with_retry(
            &self.breakers,
            &self.clock,
            "automerge.enable",
            RetryOptions::default(),
            move || {
                let codehost = Arc::clone(&codehost);
                let owner = owner.clone();
                let repo = repo.clone();
                async move { codehost.enable_auto_merge(&owner, &repo, number).await }
            },
        )
        .await;
        match result {
            Ok(()) => tracing::info!(pr = number, "auto-merge enabled"),
            Err(err) => tracing::warn!(
                pr = number,
                error = %sanitize(&err.to_string()),
                "auto-merge could not be enabled"
            ),
        }
    }

    async fn pr_status(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PrStatus, EngineError> {
        let codehost = Arc::clone(&self.codehost);
        let owner = owner.to_string();
        let repo = repo.to_string();
        with_retry(
            &self.breakers,
            &self.clock,
            "github.pr_status",
            RetryOptions::default(),
            move || {
                let codehost = Arc::clone(&codehost);
                let owner = owner.clone();
                let repo = repo.clone();
                async move { codehost.pr_status(&owner, &repo, number).await }
            },
        )
        .await
    }

    async fn move_ticket(
        &self,
        ticket_id: &str,
        state: WorkflowState,
    ) -> Result<(), EngineError> {
        let tracker = Arc::clone(&self.tracker);
        let ticket_id = ticket_id.to_string();
        with_retry(
            &self.breakers,
            &self.clock,
            "tracker.move_ticket",
            RetryOptions::default(),
            move || {
                let tracker = Arc::clone(&tracker);
                let ticket_id = ticket_id.clone();
                async move { tracker.move_ticket(&ticket_id, state).await }
            },
        )
        .await
    }

    /// Forget handled cycles and attempt counters. Tests only.
    pub fn reset(&self) {
        self.fixing.lock().clear();
        self.handled_cycles.lock().clear();
        self.automerged.lock().clear();
        self.fixer_attempts.lock().clear();
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
