// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake adapters for engine and workspace tests.
//!
//! Each fake records the calls it receives and replays scripted responses,
//! so tests can assert on ordering (state transitions, comments, spawns)
//! without any network or subprocess.

use crate::agent::{AgentSdk, AgentSdkError, AgentSpawnConfig};
use crate::codehost::{CodeHost, PrStatus};
use crate::error::RemoteError;
use crate::tracker::{ReviewTicket, Tracker};
use ap_core::{TicketRef, WorkflowState};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One recorded tracker mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCall {
    Move {
        ticket_id: String,
        state: WorkflowState,
    },
    Comment {
        ticket_id: String,
        body: String,
    },
}

/// Scripted tracker: hand it tickets, observe the transitions.
#[derive(Default)]
pub struct FakeTracker {
    tickets: Mutex<HashMap<String, TicketRef>>,
    ready: Mutex<Vec<String>>,
    review: Mutex<Vec<ReviewTicket>>,
    calls: Mutex<Vec<TrackerCall>>,
    ready_errors: Mutex<VecDeque<RemoteError>>,
    move_errors: Mutex<VecDeque<RemoteError>>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ticket in the ready queue.
    pub fn add_ready(&self, ticket: TicketRef) {
        self.ready.lock().push(ticket.id.clone());
        self.tickets.lock().insert(ticket.id.clone(), ticket);
    }

    pub fn add_review(&self, review: ReviewTicket) {
        self.tickets
            .lock()
            .insert(review.ticket.id.clone(), review.ticket.clone());
        self.review.lock().push(review);
    }

    /// Queue an error for the next `ready_tickets` call.
    pub fn fail_next_ready(&self, err: RemoteError) {
        self.ready_errors.lock().push_back(err);
    }

    /// Queue an error for the next `move_ticket` call.
    pub fn fail_next_move(&self, err: RemoteError) {
        self.move_errors.lock().push_back(err);
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.lock().clone()
    }

    /// States a ticket was moved through, in call order.
    pub fn moves_for(&self, ticket_id: &str) -> Vec<WorkflowState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TrackerCall::Move { ticket_id: id, state } if id == ticket_id => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn comments_for(&self, ticket_id: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TrackerCall::Comment { ticket_id: id, body } if id == ticket_id => {
                    Some(body.clone())
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Tracker for FakeTracker {
    async fn ready_tickets(&self, limit: usize) -> Result<Vec<TicketRef>, RemoteError> {
        if let Some(err) = self.ready_errors.lock().pop_front() {
            return Err(err);
        }
        let tickets = self.tickets.lock();
        Ok(self
            .ready
            .lock()
            .iter()
            .filter_map(|id| tickets.get(id).cloned())
            .take(limit)
            .collect())
    }

    async fn move_ticket(
        &self,
        ticket_id: &str,
        state: WorkflowState,
    ) -> Result<(), RemoteError> {
        if let Some(err) = self.move_errors.lock().pop_front() {
            return Err(err);
        }
        self.calls.lock().push(TrackerCall::Move {
            ticket_id: ticket_id.to_string(),
            state,
        });
        let mut ready = self.ready.lock();
        match state {
            WorkflowState::Ready => {
                if !ready.iter().any(|id| id == ticket_id) {
                    ready.push(ticket_id.to_string());
                }
            }
            _ => ready.retain(|id| id != ticket_id),
        }
        Ok(())
    }

    async fn create_comment(&self, ticket_id: &str, body: &str) -> Result<(), RemoteError> {
        self.calls.lock().push(TrackerCall::Comment {
            ticket_id: ticket_id.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn in_review_tickets(&self) -> Result<Vec<ReviewTicket>, RemoteError> {
        Ok(self.review.lock().clone())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Scripted code host keyed by `owner/repo#number`.
#[derive(Default)]
pub struct FakeCodeHost {
    statuses: Mutex<HashMap<String, PrStatus>>,
    automerge_calls: Mutex<Vec<String>>,
}

fn pr_key(owner: &str, repo: &str, number: u64) -> String {
    format!("{owner}/{repo}#{number}")
}

impl FakeCodeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pr(&self, owner: &str, repo: &str, status: PrStatus) {
        self.statuses
            .lock()
            .insert(pr_key(owner, repo, status.number), status);
    }

    pub fn automerge_calls(&self) -> Vec<String> {
        self.automerge_calls.lock().clone()
    }
}

#[async_trait]
impl CodeHost for FakeCodeHost {
    async fn pr_status(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PrStatus, RemoteError> {
        self.statuses
            .lock()
            .get(&pr_key(owner, repo, number))
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("no PR {}", pr_key(owner, repo, number))))
    }

    async fn enable_auto_merge(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<(), RemoteError> {
        self.automerge_calls.lock().push(pr_key(owner, repo, number));
        Ok(())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// How a scripted agent run ends after its messages are streamed.
#[derive(Debug, Clone)]
pub enum RunBehavior {
    /// Stream ends normally.
    Complete,
    /// Stream ends with an SDK error.
    StreamError(String),
    /// Block until the runner cancels (timeout and abort tests).
    HangUntilCancel,
}

/// Messages plus terminal behavior for one scripted agent run.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub messages: Vec<Value>,
    pub behavior: RunBehavior,
}

impl ScriptedRun {
    /// An init message followed by a successful result.
    pub fn success(result: &str) -> Self {
        Self {
            messages: vec![init_message("sess-fake"), success_message(result, 0.05)],
            behavior: RunBehavior::Complete,
        }
    }

    /// An init message, then the stream errors out.
    pub fn stream_error(error: &str) -> Self {
        Self {
            messages: vec![init_message("sess-fake")],
            behavior: RunBehavior::StreamError(error.to_string()),
        }
    }

    /// An init message, then silence until cancelled.
    pub fn hang() -> Self {
        Self {
            messages: vec![init_message("sess-fake")],
            behavior: RunBehavior::HangUntilCancel,
        }
    }
}

/// A `system/init` message carrying a session id.
pub fn init_message(session_id: &str) -> Value {
    json!({ "type": "system", "subtype": "init", "session_id": session_id })
}

/// A successful `result` message with cost and duration.
pub fn success_message(result: &str, cost_usd: f64) -> Value {
    json!({
        "type": "result",
        "subtype": "success",
        "result": result,
        "total_cost_usd": cost_usd,
        "duration_ms": 60_000,
        "num_turns": 8,
    })
}

/// A failed `result` message with an error list.
pub fn error_result_message(subtype: &str, errors: &[&str]) -> Value {
    json!({ "type": "result", "subtype": subtype, "errors": errors })
}

/// Scripted [`AgentSdk`]. Runs are consumed in spawn order; when the script
/// queue is empty, runs succeed with a generic result.
#[derive(Default)]
pub struct FakeAgentSdk {
    scripts: Mutex<VecDeque<ScriptedRun>>,
    spawns: Mutex<Vec<AgentSpawnConfig>>,
}

impl FakeAgentSdk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_run(&self, run: ScriptedRun) {
        self.scripts.lock().push_back(run);
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.lock().len()
    }

    pub fn spawn_configs(&self) -> Vec<AgentSpawnConfig> {
        self.spawns.lock().clone()
    }
}

#[async_trait]
impl AgentSdk for FakeAgentSdk {
    async fn spawn(
        &self,
        config: AgentSpawnConfig,
        tx: mpsc::Sender<Value>,
        cancel: CancellationToken,
    ) -> Result<(), AgentSdkError> {
        self.spawns.lock().push(config);
        let run = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedRun::success("done"));

        for message in run.messages {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if tx.send(message).await.is_err() {
                return Ok(());
            }
        }
        match run.behavior {
            RunBehavior::Complete => Ok(()),
            RunBehavior::StreamError(error) => Err(AgentSdkError::Stream(error)),
            RunBehavior::HangUntilCancel => {
                cancel.cancelled().await;
                Ok(())
            }
        }
    }
}

/// A ready ticket with sensible defaults for tests.
pub fn ticket(id: &str, identifier: &str, title: &str) -> TicketRef {
    TicketRef {
        id: id.to_string(),
        identifier: identifier.to_string(),
        title: title.to_string(),
        priority: 2,
        created_at_ms: 1_000,
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
