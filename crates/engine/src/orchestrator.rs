// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The main loop: tick, dispatch, monitor, sweep, sleep.
//!
//! Each tick fills executor slots, checks open PRs, and runs scheduled
//! passes. The inter-tick sleep is interruptible: a webhook trigger or the
//! shutdown token cuts it short. Shutdown aborts the root token, which
//! propagates into every runner, then drains outstanding run handles with
//! a grace period.

use crate::breaker::BreakerRegistry;
use crate::clones::{clone_name_for, CloneManager};
use crate::executor::Executor;
use crate::gate::SpawnGate;
use crate::monitor::Monitor;
use crate::passes::Passes;
use crate::runner::AgentRunner;
use crate::state::AppState;
use crate::webhook::Trigger;
use ap_adapters::{AgentSdk, CodeHost, Tracker};
use ap_core::{Clock, Config};
use ap_storage::Store;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Clones are swept every this many ticks.
const SWEEP_EVERY_TICKS: u64 = 10;

/// How long shutdown waits for outstanding (already aborted) runs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// External collaborators handed to the orchestrator.
pub struct OrchestratorDeps<T, H, K, C: Clock> {
    pub tracker: Arc<T>,
    /// Absent when no code-host token is configured; disables the monitor.
    pub codehost: Option<Arc<H>>,
    pub sdk: Arc<K>,
    pub clock: C,
}

pub struct Orchestrator<T, H, K, C: Clock> {
    config: Config,
    repo_slug: Option<(String, String)>,
    state: Arc<AppState<C>>,
    store: Option<Arc<Store>>,
    executor: Arc<Executor<T, K, C>>,
    monitor: Option<Arc<Monitor<T, H, K, C>>>,
    passes: Arc<Passes<K, C>>,
    clones: CloneManager,
    trigger: Arc<Trigger>,
    clock: C,
}

impl<T, H, K, C> Orchestrator<T, H, K, C>
where
    T: Tracker,
    H: CodeHost,
    K: AgentSdk,
    C: Clock,
{
    pub fn new(
        config: Config,
        project_path: PathBuf,
        repo_slug: Option<(String, String)>,
        deps: OrchestratorDeps<T, H, K, C>,
        store: Option<Arc<Store>>,
    ) -> Self {
        let clock = deps.clock;
        let breakers = Arc::new(BreakerRegistry::default());
        let state = Arc::new(AppState::new(
            clock.clone(),
            config.executor.parallel as usize,
            Arc::clone(&breakers),
        ));
        if let Some(store) = &store {
            state.attach_store(Arc::clone(store));
        }

        let runner = Arc::new(AgentRunner::new(
            deps.sdk,
            SpawnGate::new(),
            CloneManager::new(&project_path),
            clock.clone(),
        ));
        let executor = Arc::new(Executor::new(
            Arc::clone(&deps.tracker),
            Arc::clone(&runner),
            Arc::clone(&state),
            Arc::clone(&breakers),
            clock.clone(),
            project_path.clone(),
            store.clone(),
        ));
        let monitor = deps.codehost.map(|codehost| {
            Arc::new(Monitor::new(
                Arc::clone(&deps.tracker),
                codehost,
                Arc::clone(&runner),
                Arc::clone(&state),
                Arc::clone(&breakers),
                clock.clone(),
                project_path.clone(),
            ))
        });
        let passes = Arc::new(Passes::new(
            Arc::clone(&runner),
            Arc::clone(&state),
            store.clone(),
            clock.clone(),
            project_path.clone(),
        ));

        Self {
            config,
            repo_slug,
            state,
            store,
            executor,
            monitor,
            passes,
            clones: CloneManager::new(&project_path),
            trigger: Arc::new(Trigger::new()),
            clock,
        }
    }

    /// Trigger object the webhook endpoint fires into.
    pub fn trigger(&self) -> Arc<Trigger> {
        Arc::clone(&self.trigger)
    }

    pub fn state(&self) -> Arc<AppState<C>> {
        Arc::clone(&self.state)
    }

    /// Run until `root` is cancelled, then drain.
    pub async fn run(&self, root: CancellationToken) {
        let mut handles: Vec<JoinHandle<bool>> = Vec::new();
        let mut tick: u64 = 0;
        tracing::info!(
            parallel = self.config.executor.parallel,
            monitor = self.monitor.is_some(),
            "orchestrator started"
        );

        while !root.is_cancelled() {
            tick += 1;
            handles.retain(|handle| !handle.is_finished());

            handles.extend(self.executor.fill_slots(&self.config, Some(&root)).await);

            if let (Some(monitor), Some((owner, repo))) = (&self.monitor, &self.repo_slug) {
                handles.extend(
                    monitor
                        .check_open_prs(owner, repo, &self.config, Some(&root))
                        .await,
                );
            }

            if let Some(handle) = self.passes.maybe_spawn_planning(&self.config, Some(&root)) {
                handles.push(handle);
            }
            if let Some(handle) = self.passes.maybe_spawn_review(&self.config, Some(&root)) {
                handles.push(handle);
            }
            if let Some(handle) = self
                .passes
                .maybe_spawn_project_owner(&self.config, Some(&root))
            {
                handles.push(handle);
            }

            if tick % SWEEP_EVERY_TICKS == 0 {
                self.clones.sweep_clones(&self.active_clone_names()).await;
                self.prune_retention();
            }

            let sleep_ms =
                (self.config.executor.poll_interval_minutes * 60_000.0).max(1.0) as u64;
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {}
                event = self.trigger.wait() => {
                    tracing::info!(%event, "woken early by webhook");
                }
                _ = root.cancelled() => break,
            }
        }

        handles.retain(|handle| !handle.is_finished());
        tracing::info!(outstanding = handles.len(), "shutting down, draining agent runs");
        for handle in handles {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                tracing::warn!("agent run did not drain within the grace period");
            }
        }
        tracing::info!("orchestrator stopped");
    }

    /// Clone names belonging to live agents; both the executor and the
    /// fixer naming schemes are protected from the sweep.
    fn active_clone_names(&self) -> HashSet<String> {
        self.state
            .live_agents()
            .into_iter()
            .flat_map(|agent| {
                let base = clone_name_for(&agent.ticket_id);
                [format!("{base}-fix"), base]
            })
            .collect()
    }

    fn prune_retention(&self) {
        let Some(store) = &self.store else { return };
        let days = self.config.persistence.retention_days;
        if days == 0 {
            return;
        }
        let now = self.clock.epoch_ms();
        match store.prune_activity_logs(days, now) {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "pruned old activity rows"),
            Err(err) => tracing::warn!(error = %err, "activity prune failed"),
        }
        match store.prune_conversation_logs(days, now) {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "pruned old transcripts"),
            Err(err) => tracing::warn!(error = %err, "transcript prune failed"),
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
