// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runner: one agent process from spawn to terminal outcome.
//!
//! The runner acquires the spawn gate, prepares the sandbox clone, builds
//! an allowlisted environment, then consumes the SDK's message stream while
//! enforcing the overall timeout and the inactivity watchdog. Exactly one
//! terminal outcome is reported, and cleanup (gate release, clone removal)
//! runs on every return path.

use crate::clones::CloneManager;
use crate::gate::SpawnGate;
use crate::messages::process_message;
use ap_adapters::{AgentSdk, AgentSpawnConfig};
use ap_core::{ActivityEntry, Clock, ExitReason};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Only these make it from the orchestrator's environment into an agent.
const INHERITED_ENV: &[&str] = &[
    "HOME",
    "PATH",
    "SSH_AUTH_SOCK",
    "ANTHROPIC_API_KEY",
    "CLAUDE_CODE_OAUTH_TOKEN",
];

#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Overall run timeout in milliseconds; 0 disables.
    pub timeout_ms: u64,
    /// Watchdog reset on every streamed message; 0 disables.
    pub inactivity_ms: u64,
    pub model: Option<String>,
    pub mcp_servers: Option<Value>,
    pub agents: Option<Value>,
    /// Shutdown token from the main loop.
    pub parent: Option<CancellationToken>,
}

/// One agent run to perform.
#[derive(Debug, Clone, Default)]
pub struct AgentRunSpec {
    pub prompt: String,
    /// Working directory when no clone is requested (planning, review).
    pub working_dir: PathBuf,
    /// Sandbox clone to create and run inside.
    pub clone_name: Option<String>,
    /// Fixer mode: check out this existing branch instead of cutting one.
    pub from_branch: Option<String>,
    pub options: RunnerOptions,
}

/// Terminal outcome of one agent run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub result: Option<String>,
    pub session_id: Option<String>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
    pub error: Option<String>,
    pub timed_out: bool,
    pub exit_reason: ExitReason,
    /// Raw streamed messages, for the sanitized transcript.
    pub messages: Vec<Value>,
}

impl RunOutput {
    /// Map the outcome onto a terminal agent status: no error means
    /// completed; a timer-driven exit is timed out; everything else failed.
    pub fn status(&self) -> ap_core::AgentStatus {
        if self.error.is_none() {
            ap_core::AgentStatus::Completed
        } else if matches!(
            self.exit_reason,
            ExitReason::Timeout | ExitReason::Inactivity
        ) {
            ap_core::AgentStatus::TimedOut
        } else {
            ap_core::AgentStatus::Failed
        }
    }

    /// Completion metadata for the state layer.
    pub fn meta(&self, run_type: ap_core::RunType) -> ap_core::RunMeta {
        ap_core::RunMeta {
            cost_usd: self.cost_usd,
            duration_ms: self.duration_ms,
            num_turns: self.num_turns,
            error: self.error.clone(),
            session_id: self.session_id.clone(),
            exit_reason: Some(self.exit_reason),
            run_type: Some(run_type),
        }
    }

    fn pending() -> Self {
        Self {
            result: None,
            session_id: None,
            cost_usd: None,
            duration_ms: None,
            num_turns: None,
            error: None,
            timed_out: false,
            exit_reason: ExitReason::Error,
            messages: Vec::new(),
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::pending()
        }
    }
}

pub struct AgentRunner<K, C: Clock> {
    sdk: Arc<K>,
    gate: SpawnGate,
    clones: CloneManager,
    clock: C,
}

impl<K: AgentSdk, C: Clock> AgentRunner<K, C> {
    pub fn new(sdk: Arc<K>, gate: SpawnGate, clones: CloneManager, clock: C) -> Self {
        Self {
            sdk,
            gate,
            clones,
            clock,
        }
    }

    pub fn gate(&self) -> &SpawnGate {
        &self.gate
    }

    /// Run one agent to completion. Activities are forwarded in stream
    /// order; the session id is always seen before any result.
    pub async fn run(
        &self,
        spec: AgentRunSpec,
        mut on_activity: impl FnMut(ActivityEntry),
    ) -> RunOutput {
        // Serialize the launch phase. The permit is released on the first
        // `system/init` message, not at the end of the run.
        let permit = self.gate.acquire().await;

        let mut created_clone = None;
        let cwd = match &spec.clone_name {
            Some(name) => match self
                .clones
                .create_clone(name, spec.from_branch.as_deref())
                .await
            {
                Ok(checkout) => {
                    created_clone = Some(name.clone());
                    checkout.path
                }
                Err(err) => {
                    permit.release();
                    return RunOutput::failed(format!("clone failed: {err}"));
                }
            },
            None => spec.working_dir.clone(),
        };

        let config = AgentSpawnConfig {
            prompt: spec.prompt.clone(),
            cwd: cwd.clone(),
            model: spec.options.model.clone(),
            env: build_env(),
            mcp_servers: spec.options.mcp_servers.clone(),
            agents: spec.options.agents.clone(),
        };

        let cancel = match &spec.options.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        let (tx, mut rx) = mpsc::channel::<Value>(64);
        let sdk = Arc::clone(&self.sdk);
        let sdk_cancel = cancel.clone();
        let sdk_task = tokio::spawn(async move { sdk.spawn(config, tx, sdk_cancel).await });

        let overall_deadline = (spec.options.timeout_ms > 0)
            .then(|| tokio::time::Instant::now() + Duration::from_millis(spec.options.timeout_ms));
        let inactivity = (spec.options.inactivity_ms > 0)
            .then(|| Duration::from_millis(spec.options.inactivity_ms));
        let mut inactivity_deadline = inactivity.map(|window| tokio::time::Instant::now() + window);

        let mut out = RunOutput::pending();
        let mut cancel_cause: Option<ExitReason> = None;

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => {
                        let processed =
                            process_message(&message, Some(&cwd), self.clock.epoch_ms());
                        if let Some(session_id) = processed.session_id {
                            out.session_id = Some(session_id);
                            // launch phase is over; let the next spawn through
                            permit.release();
                        }
                        for activity in processed.activities {
                            on_activity(activity);
                        }
                        if let Some(success) = processed.success {
                            out.result = Some(success.result);
                            out.cost_usd = success.cost_usd;
                            out.duration_ms = success.duration_ms;
                            out.num_turns = success.num_turns;
                        }
                        if let Some(error) = processed.error {
                            out.error = Some(error);
                        }
                        out.messages.push(message);
                        inactivity_deadline =
                            inactivity.map(|window| tokio::time::Instant::now() + window);
                    }
                    None => break,
                },
                _ = sleep_until_opt(overall_deadline) => {
                    cancel_cause = Some(ExitReason::Timeout);
                    cancel.cancel();
                    break;
                }
                _ = sleep_until_opt(inactivity_deadline) => {
                    cancel_cause = Some(ExitReason::Inactivity);
                    cancel.cancel();
                    break;
                }
                _ = cancelled_opt(spec.options.parent.as_ref()) => {
                    cancel_cause = Some(ExitReason::Aborted);
                    cancel.cancel();
                    break;
                }
            }
        }

        // Let the SDK finish killing and reaping the child.
        let sdk_result = sdk_task.await;

        match cancel_cause {
            Some(ExitReason::Timeout) => {
                out.timed_out = true;
                out.exit_reason = ExitReason::Timeout;
                out.error = Some("Timed out".to_string());
            }
            Some(ExitReason::Inactivity) => {
                out.exit_reason = ExitReason::Inactivity;
                out.error = Some("Inactivity timeout".to_string());
            }
            Some(ExitReason::Aborted) => {
                out.exit_reason = ExitReason::Aborted;
                out.error = Some("Aborted (shutdown)".to_string());
            }
            _ => match sdk_result {
                Ok(Ok(())) => {
                    if out.error.is_some() {
                        out.exit_reason = ExitReason::Error;
                    } else if out.result.is_some() {
                        out.exit_reason = ExitReason::Success;
                    } else {
                        out.exit_reason = ExitReason::Error;
                        out.error = Some("agent stream ended without a result".to_string());
                    }
                }
                Ok(Err(sdk_err)) => {
                    out.exit_reason = ExitReason::Error;
                    if out.error.is_none() {
                        out.error = Some(sdk_err.to_string());
                    }
                }
                Err(join_err) => {
                    out.exit_reason = ExitReason::Error;
                    out.error = Some(format!("agent task panicked: {join_err}"));
                }
            },
        }

        // Cleanup on every path: the release is idempotent, and the clone
        // goes away (keeping the PR branch in fixer mode).
        permit.release();
        if let Some(name) = created_clone {
            self.clones
                .remove_clone(&name, spec.from_branch.is_some())
                .await;
        }
        out
    }
}

/// Allowlisted environment plus the fixed agent flags. No process-global
/// secrets beyond the provider key ever reach an agent.
fn build_env() -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = INHERITED_ENV
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
        .collect();
    env.push(("AGENT_TEAMS".to_string(), "1".to_string()));
    env.push(("GIT_CONFIG_NOSYSTEM".to_string(), "1".to_string()));
    env.push(("GIT_CONFIG_GLOBAL".to_string(), "/dev/null".to_string()));
    env
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn cancelled_opt(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
