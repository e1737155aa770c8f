// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled background passes: planning, run review, project ownership.
//!
//! Each pass spawns at most one agent, runs in the project root (no clone;
//! these agents work through the tracker, not the repository), and records
//! itself under a pseudo ticket id so the live-agent invariants apply to it
//! too.

use crate::prompts;
use crate::runner::{AgentRunSpec, AgentRunner, RunnerOptions};
use crate::state::AppState;
use ap_adapters::AgentSdk;
use ap_core::{Clock, Config, RunId, RunType};
use ap_storage::{PlanningSessionRow, Store};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Passes<K, C: Clock> {
    runner: Arc<AgentRunner<K, C>>,
    state: Arc<AppState<C>>,
    store: Option<Arc<Store>>,
    clock: C,
    project_path: PathBuf,
    last_project_pass_ms: Mutex<Option<u64>>,
}

impl<K, C> Passes<K, C>
where
    K: AgentSdk,
    C: Clock,
{
    pub fn new(
        runner: Arc<AgentRunner<K, C>>,
        state: Arc<AppState<C>>,
        store: Option<Arc<Store>>,
        clock: C,
        project_path: PathBuf,
    ) -> Self {
        Self {
            runner,
            state,
            store,
            clock,
            project_path,
            last_project_pass_ms: Mutex::new(None),
        }
    }

    /// Spawn a planning agent when the ready queue has drained and the
    /// interval elapsed. At most one planning agent at a time.
    pub fn maybe_spawn_planning(
        self: &Arc<Self>,
        config: &Config,
        root: Option<&CancellationToken>,
    ) -> Option<JoinHandle<bool>> {
        if !config.planning.enabled {
            return None;
        }
        let now = self.clock.epoch_ms();
        let planning = self.state.planning();
        if planning.running {
            return None;
        }
        if let Some(last) = planning.last_run_ms {
            if now.saturating_sub(last) < minutes_to_ms(config.planning.interval_minutes) {
                return None;
            }
        }
        if self.state.queue().ready > config.planning.ready_threshold as usize {
            return None;
        }

        self.state.update_planning(|status| status.running = true);
        let passes = Arc::clone(self);
        let config = config.clone();
        let root = root.cloned();
        Some(tokio::spawn(async move {
            passes.run_planning(&config, root).await
        }))
    }

    async fn run_planning(&self, config: &Config, root: Option<CancellationToken>) -> bool {
        let started_at = self.clock.epoch_ms();
        let run_id = RunId::generate();
        if !self
            .state
            .add_agent(run_id.clone(), "planning", "Planning pass", None)
        {
            self.state.update_planning(|status| status.running = false);
            return false;
        }
        let output = self
            .run_pass_agent(
                &run_id,
                prompts::planning_prompt(config),
                &config.planning.model,
                config.planning.timeout_minutes,
                config.executor.inactivity_timeout_minutes,
                root,
            )
            .await;

        let status = output.status();
        let result_note = output
            .result
            .clone()
            .or_else(|| output.error.clone())
            .unwrap_or_default();
        self.state.complete_agent(
            &run_id,
            status,
            output.meta(RunType::Planning),
            Some(&output.messages),
        );

        if let Some(store) = &self.store {
            let session = PlanningSessionRow {
                run_id: run_id.to_string(),
                started_at_ms: started_at,
                finished_at_ms: Some(self.clock.epoch_ms()),
                status: status.as_str().to_string(),
                cost_usd: output.cost_usd,
            };
            if let Err(err) = store.insert_planning_session(&session) {
                tracing::error!(error = %err, "failed to record planning session");
            }
        }

        let now = self.clock.epoch_ms();
        self.state.update_planning(|pass| {
            pass.running = false;
            pass.last_run_ms = Some(now);
            pass.last_result = Some(ap_core::truncate_summary(&result_note));
        });
        status == ap_core::AgentStatus::Completed
    }

    /// Spawn a review agent over the oldest unreviewed runs.
    pub fn maybe_spawn_review(
        self: &Arc<Self>,
        config: &Config,
        root: Option<&CancellationToken>,
    ) -> Option<JoinHandle<bool>> {
        if !config.reviewer.enabled {
            return None;
        }
        let store = self.store.clone()?;
        let now = self.clock.epoch_ms();
        let reviewer = self.state.reviewer();
        if reviewer.running {
            return None;
        }
        if let Some(last) = reviewer.last_run_ms {
            if now.saturating_sub(last) < minutes_to_ms(config.reviewer.interval_minutes) {
                return None;
            }
        }
        let mut batch = match store.unreviewed_runs(config.reviewer.batch_size as usize) {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(error = %err, "unreviewed run query failed");
                return None;
            }
        };
        // only ticket work gets reviewed; pass runs reviewing pass runs
        // would never converge
        batch.retain(|run| matches!(run.run_type, RunType::Executor | RunType::Fixer));
        if batch.is_empty() {
            return None;
        }

        self.state.update_reviewer(|status| status.running = true);
        let passes = Arc::clone(self);
        let config = config.clone();
        let root = root.cloned();
        Some(tokio::spawn(async move {
            passes.run_review(&config, batch, root).await
        }))
    }

    async fn run_review(
        &self,
        config: &Config,
        batch: Vec<ap_core::RunRecord>,
        root: Option<CancellationToken>,
    ) -> bool {
        let run_id = RunId::generate();
        if !self
            .state
            .add_agent(run_id.clone(), "review", "Run review pass", None)
        {
            self.state.update_reviewer(|status| status.running = false);
            return false;
        }
        let output = self
            .run_pass_agent(
                &run_id,
                prompts::review_prompt(&batch),
                &config.reviewer.model,
                config.reviewer.timeout_minutes,
                config.executor.inactivity_timeout_minutes,
                root,
            )
            .await;

        let status = output.status();
        self.state.complete_agent(
            &run_id,
            status,
            output.meta(RunType::Review),
            Some(&output.messages),
        );

        let reviewed = status == ap_core::AgentStatus::Completed;
        if reviewed {
            if let Some(store) = &self.store {
                let ids: Vec<String> = batch.iter().map(|run| run.id.to_string()).collect();
                match store.mark_runs_reviewed(&ids, self.clock.epoch_ms()) {
                    Ok(count) => tracing::info!(count, "runs marked reviewed"),
                    Err(err) => tracing::error!(error = %err, "failed to mark runs reviewed"),
                }
            }
        }

        let now = self.clock.epoch_ms();
        self.state.update_reviewer(|pass| {
            pass.running = false;
            pass.last_run_ms = Some(now);
            pass.last_result = Some(format!("reviewed {} run(s)", batch.len()));
        });
        reviewed
    }

    /// Spawn a project-owner agent on its own slower cadence.
    pub fn maybe_spawn_project_owner(
        self: &Arc<Self>,
        config: &Config,
        root: Option<&CancellationToken>,
    ) -> Option<JoinHandle<bool>> {
        if !config.projects.enabled {
            return None;
        }
        let now = self.clock.epoch_ms();
        {
            let last = self.last_project_pass_ms.lock();
            if let Some(last) = *last {
                if now.saturating_sub(last) < minutes_to_ms(config.projects.interval_minutes) {
                    return None;
                }
            }
        }
        if self.state.has_live_ticket("project-owner") {
            return None;
        }
        *self.last_project_pass_ms.lock() = Some(now);

        let passes = Arc::clone(self);
        let config = config.clone();
        let root = root.cloned();
        Some(tokio::spawn(async move {
            let run_id = RunId::generate();
            if !passes
                .state
                .add_agent(run_id.clone(), "project-owner", "Project owner pass", None)
            {
                return false;
            }
            let output = passes
                .run_pass_agent(
                    &run_id,
                    prompts::project_owner_prompt(&config),
                    &config.projects.model,
                    config.projects.timeout_minutes,
                    config.executor.inactivity_timeout_minutes,
                    root,
                )
                .await;
            let status = output.status();
            passes.state.complete_agent(
                &run_id,
                status,
                output.meta(RunType::ProjectOwner),
                Some(&output.messages),
            );
            status == ap_core::AgentStatus::Completed
        }))
    }

    async fn run_pass_agent(
        &self,
        run_id: &RunId,
        prompt: String,
        model: &str,
        timeout_minutes: u32,
        inactivity_minutes: u32,
        root: Option<CancellationToken>,
    ) -> crate::runner::RunOutput {
        let token = match &root {
            Some(root) => root.child_token(),
            None => CancellationToken::new(),
        };
        self.state.register_controller(run_id.clone(), token.clone());

        let spec = AgentRunSpec {
            prompt,
            working_dir: self.project_path.clone(),
            clone_name: None,
            from_branch: None,
            options: RunnerOptions {
                timeout_ms: u64::from(timeout_minutes) * 60_000,
                inactivity_ms: u64::from(inactivity_minutes) * 60_000,
                model: crate::executor::some_model(model),
                mcp_servers: None,
                agents: None,
                parent: Some(token),
            },
        };
        let state = Arc::clone(&self.state);
        let activity_run_id = run_id.clone();
        self.runner
            .run(spec, move |activity| {
                state.add_activity(&activity_run_id, activity)
            })
            .await
    }
}

fn minutes_to_ms(minutes: f64) -> u64 {
    (minutes * 60_000.0) as u64
}

#[cfg(test)]
#[path = "passes_tests.rs"]
mod tests;
