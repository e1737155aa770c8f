// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor: fill agent slots from ready tickets and drive each ticket to
//! its next workflow state.
//!
//! Dispatch is bounded by the configured parallelism and guarded twice:
//! live-agent membership in state and a process-local active set, so a
//! re-entered `fill_slots` can never double-dispatch a ticket.

use crate::breaker::BreakerRegistry;
use crate::clones::clone_name_for;
use crate::error::EngineError;
use crate::prompts;
use crate::retry::{with_retry, RetryOptions};
use crate::runner::{AgentRunSpec, AgentRunner, RunnerOptions};
use crate::state::AppState;
use ap_adapters::{AgentSdk, Tracker};
use ap_core::{sanitize, AgentStatus, Clock, Config, RunId, RunType, TicketRef, WorkflowState};
use ap_storage::Store;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Ready tickets requested per poll; slots are filled from the front.
const READY_POLL_LIMIT: usize = 50;

pub struct Executor<T, K, C: Clock> {
    tracker: Arc<T>,
    runner: Arc<AgentRunner<K, C>>,
    state: Arc<AppState<C>>,
    breakers: Arc<BreakerRegistry>,
    clock: C,
    project_path: PathBuf,
    /// Token source for MCP descriptors handed to agents.
    store: Option<Arc<Store>>,
    /// Ticket identifiers with a dispatch in flight.
    active: Mutex<HashSet<String>>,
}

impl<T, K, C> Executor<T, K, C>
where
    T: Tracker,
    K: AgentSdk,
    C: Clock,
{
    pub fn new(
        tracker: Arc<T>,
        runner: Arc<AgentRunner<K, C>>,
        state: Arc<AppState<C>>,
        breakers: Arc<BreakerRegistry>,
        clock: C,
        project_path: PathBuf,
        store: Option<Arc<Store>>,
    ) -> Self {
        Self {
            tracker,
            runner,
            state,
            breakers,
            clock,
            project_path,
            store,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Poll ready tickets and launch one agent per free slot. Returns the
    /// in-flight run handles; the caller owns joining them.
    pub async fn fill_slots(
        self: &Arc<Self>,
        config: &Config,
        root: Option<&CancellationToken>,
    ) -> Vec<JoinHandle<bool>> {
        if self.state.is_paused() {
            tracing::debug!("paused, skipping dispatch");
            return Vec::new();
        }
        let verdict = self.state.check_budget(&config.budget);
        if !verdict.ok {
            tracing::warn!(
                reason = verdict.reason.as_deref().unwrap_or(""),
                "budget exhausted, skipping dispatch"
            );
            return Vec::new();
        }
        if let Some(warning) = self.state.budget_warning(&config.budget) {
            tracing::warn!(%warning, "approaching budget limit");
        }

        let available = self
            .state
            .max_parallel()
            .saturating_sub(self.state.running_count());
        if available == 0 {
            return Vec::new();
        }

        let tracker = Arc::clone(&self.tracker);
        let tickets = match with_retry(
            &self.breakers,
            &self.clock,
            "tracker.ready_tickets",
            RetryOptions::default(),
            move || {
                let tracker = Arc::clone(&tracker);
                async move { tracker.ready_tickets(READY_POLL_LIMIT).await }
            },
        )
        .await
        {
            Ok(tickets) => tickets,
            Err(err) => {
                tracing::warn!(error = %sanitize(&err.to_string()), "ready ticket poll failed");
                return Vec::new();
            }
        };
        self.state
            .update_queue(tickets.len(), self.state.running_count());

        let chosen: Vec<TicketRef> = {
            let mut active = self.active.lock();
            let mut chosen = Vec::new();
            for ticket in tickets {
                if chosen.len() == available {
                    break;
                }
                if active.contains(&ticket.identifier)
                    || self.state.has_live_ticket(&ticket.identifier)
                {
                    continue;
                }
                active.insert(ticket.identifier.clone());
                chosen.push(ticket);
            }
            chosen
        };

        let mut handles = Vec::new();
        for ticket in chosen {
            tracing::info!(ticket = %ticket.identifier, "dispatching agent");
            let executor = Arc::clone(self);
            let config = config.clone();
            let root = root.cloned();
            handles.push(tokio::spawn(async move {
                executor.execute_issue(ticket, &config, root).await
            }));
        }
        handles
    }

    /// Run one ticket end to end. Returns true when the ticket reached
    /// `in_review`.
    pub async fn execute_issue(
        self: &Arc<Self>,
        ticket: TicketRef,
        config: &Config,
        root: Option<CancellationToken>,
    ) -> bool {
        // ensure a slot is held even when called directly (tests, webhook)
        self.active.lock().insert(ticket.identifier.clone());
        let done = self.execute_issue_inner(&ticket, config, root).await;
        self.active.lock().remove(&ticket.identifier);
        done
    }

    async fn execute_issue_inner(
        &self,
        ticket: &TicketRef,
        config: &Config,
        root: Option<CancellationToken>,
    ) -> bool {
        // Claim the ticket first; everything after this runs with the
        // tracker showing in_progress.
        if let Err(err) = self
            .move_ticket(&ticket.id, WorkflowState::InProgress)
            .await
        {
            tracing::error!(
                ticket = %ticket.identifier,
                error = %sanitize(&err.to_string()),
                "could not claim ticket"
            );
            return false;
        }

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
            prompt: prompts::executor_prompt(ticket, config),
            working_dir: self.project_path.clone(),
            clone_name: Some(clone_name_for(&ticket.identifier)),
            from_branch: None,
            options: RunnerOptions {
                timeout_ms: u64::from(config.executor.timeout_minutes) * 60_000,
                inactivity_ms: u64::from(config.executor.inactivity_timeout_minutes) * 60_000,
                model: some_model(&config.executor.model),
                mcp_servers: self.mcp_descriptors(),
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

        if config.budget.per_agent_limit_usd > 0.0 {
            if let Some(cost) = output.cost_usd {
                if cost > config.budget.per_agent_limit_usd {
                    tracing::warn!(
                        ticket = %ticket.identifier,
                        cost_usd = cost,
                        limit_usd = config.budget.per_agent_limit_usd,
                        "agent exceeded its per-run budget"
                    );
                }
            }
        }

        self.state.complete_agent(
            &run_id,
            status,
            output.meta(RunType::Executor),
            Some(&output.messages),
        );

        match status {
            AgentStatus::Completed => {
                if let Err(err) = self.move_ticket(&ticket.id, WorkflowState::InReview).await {
                    tracing::error!(
                        ticket = %ticket.identifier,
                        error = %sanitize(&err.to_string()),
                        "agent finished but ticket could not move to review"
                    );
                }
                self.state.clear_issue_failures(&ticket.identifier);
                tracing::info!(ticket = %ticket.identifier, "ticket ready for review");
                true
            }
            _ => {
                let failures = self.state.increment_issue_failures(&ticket.identifier);
                let error = output.error.unwrap_or_else(|| "unknown failure".to_string());
                if failures < config.executor.max_retries {
                    tracing::warn!(
                        ticket = %ticket.identifier,
                        failures,
                        error = %sanitize(&error),
                        "agent failed, returning ticket to ready"
                    );
                    if let Err(err) = self.move_ticket(&ticket.id, WorkflowState::Ready).await {
                        tracing::error!(
                            ticket = %ticket.identifier,
                            error = %sanitize(&err.to_string()),
                            "could not return ticket to ready"
                        );
                    }
                } else {
                    tracing::error!(
                        ticket = %ticket.identifier,
                        failures,
                        error = %sanitize(&error),
                        "retries exhausted, blocking ticket"
                    );
                    if let Err(err) = self.move_ticket(&ticket.id, WorkflowState::Blocked).await {
                        tracing::error!(
                            ticket = %ticket.identifier,
                            error = %sanitize(&err.to_string()),
                            "could not block ticket"
                        );
                    }
                    let comment = format!(
                        "Autopilot gave up on this ticket after {failures} failed run(s).\n\nLast error: {}",
                        sanitize(&error)
                    );
                    if let Err(err) = self.comment(&ticket.id, &comment).await {
                        tracing::error!(
                            ticket = %ticket.identifier,
                            error = %sanitize(&err.to_string()),
                            "could not post blocking comment"
                        );
                    }
                }
                false
            }
        }
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

    async fn comment(&self, ticket_id: &str, body: &str) -> Result<(), EngineError> {
        let tracker = Arc::clone(&self.tracker);
        let ticket_id = ticket_id.to_string();
        let body = body.to_string();
        with_retry(
            &self.breakers,
            &self.clock,
            "tracker.create_comment",
            RetryOptions::default(),
            move || {
                let tracker = Arc::clone(&tracker);
                let ticket_id = ticket_id.clone();
                let body = body.clone();
                async move { tracker.create_comment(&ticket_id, &body).await }
            },
        )
        .await
    }

    /// MCP server descriptors for agents, with the tracker bearer token
    /// resolved from the store at spawn time.
    fn mcp_descriptors(&self) -> Option<Value> {
        let store = self.store.as_ref()?;
        let token = match store.oauth_token("linear") {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(error = %err, "oauth token lookup failed");
                return None;
            }
        };
        Some(json!({
            "linear": {
                "type": "http",
                "url": "https://mcp.linear.app/mcp",
                "headers": {
                    "Authorization": format!("Bearer {}", token.access_token),
                },
            }
        }))
    }
}

/// Empty model strings mean "use the SDK default".
pub(crate) fn some_model(model: &str) -> Option<String> {
    if model.is_empty() {
        None
    } else {
        Some(model.to_string())
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
