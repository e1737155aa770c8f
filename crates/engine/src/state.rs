// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application state: the single in-process owner of mutable orchestrator
//! state.
//!
//! Live agents, bounded history, the spend log, per-ticket failure
//! counters, the pause flag, and queue/pass snapshots all live behind one
//! mutex. The store is attached after construction and written
//! best-effort: a persistence failure never corrupts in-memory state.

use crate::breaker::BreakerRegistry;
use ap_core::{
    ActivityEntry, AgentStatus, BudgetSection, Clock, LiveAgent, RunId, RunMeta, RunRecord,
};
use ap_storage::Store;
use chrono::{Datelike, TimeZone, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// In-memory history entries; the store keeps the rest.
pub const HISTORY_CAP: usize = 50;

/// Per-ticket failure counters retained; oldest insertion evicted beyond.
pub const FAILURE_MAP_CAP: usize = 1000;

/// Spend entries older than this are evicted on insert.
pub const SPEND_RETENTION_DAYS: u64 = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub ready: usize,
    pub in_progress: usize,
    pub last_checked_at_ms: u64,
}

/// Status of a background pass (planning, reviewer).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassStatus {
    pub running: bool,
    pub last_run_ms: Option<u64>,
    pub last_result: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct SpendEntry {
    timestamp_ms: u64,
    cost_usd: f64,
}

/// Budget check outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetVerdict {
    pub ok: bool,
    pub reason: Option<String>,
}

impl BudgetVerdict {
    fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn exceeded(reason: String) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

#[derive(Default)]
struct StateInner {
    agents: IndexMap<RunId, LiveAgent>,
    history: VecDeque<RunRecord>,
    controllers: HashMap<RunId, CancellationToken>,
    spend: VecDeque<SpendEntry>,
    failures: IndexMap<String, u32>,
    paused: bool,
    queue: QueueSnapshot,
    planning: PassStatus,
    reviewer: PassStatus,
}

pub struct AppState<C: Clock> {
    clock: C,
    max_parallel: usize,
    breakers: Arc<BreakerRegistry>,
    store: Mutex<Option<Arc<Store>>>,
    inner: Mutex<StateInner>,
}

impl<C: Clock> AppState<C> {
    /// State without a store; nothing is persisted until `attach_store`.
    pub fn new(clock: C, max_parallel: usize, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            clock,
            max_parallel,
            breakers,
            store: Mutex::new(None),
            inner: Mutex::new(StateInner::default()),
        }
    }

    /// Inject the store once it is open. State depends on the store, never
    /// the reverse.
    pub fn attach_store(&self, store: Arc<Store>) {
        *self.store.lock() = Some(store);
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    // === Live agents ===

    /// Register a live agent. Refuses a second agent for the same ticket.
    pub fn add_agent(
        &self,
        id: RunId,
        ticket_id: &str,
        ticket_title: &str,
        tracker_issue_id: Option<String>,
    ) -> bool {
        let now = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        if inner.agents.values().any(|agent| agent.ticket_id == ticket_id) {
            tracing::warn!(ticket_id, "refusing duplicate agent for live ticket");
            return false;
        }
        inner.agents.insert(
            id.clone(),
            LiveAgent::new(id, ticket_id, ticket_title, tracker_issue_id, now),
        );
        true
    }

    /// Append an activity to a live agent; unknown ids are ignored.
    pub fn add_activity(&self, id: &RunId, entry: ActivityEntry) {
        let mut inner = self.inner.lock();
        if let Some(agent) = inner.agents.get_mut(id) {
            agent.push_activity(entry);
        }
    }

    pub fn register_controller(&self, id: RunId, token: CancellationToken) {
        self.inner.lock().controllers.insert(id, token);
    }

    /// Abort a live agent's cancellation token. Unknown ids return false.
    pub fn cancel_agent(&self, id: &RunId) -> bool {
        let inner = self.inner.lock();
        match inner.controllers.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Move an agent out of the live set, into history, and persist the
    /// run, its activities, and the sanitized transcript. Persistence is
    /// best-effort; the in-memory move already happened.
    pub fn complete_agent(
        &self,
        id: &RunId,
        status: AgentStatus,
        meta: RunMeta,
        raw_messages: Option<&[Value]>,
    ) -> Option<RunRecord> {
        let now = self.clock.epoch_ms();
        let (record, activities) = {
            let mut inner = self.inner.lock();
            let agent = inner.agents.shift_remove(id)?;
            inner.controllers.remove(id);
            let activities: Vec<ActivityEntry> = agent.activities.iter().cloned().collect();
            let record = agent.into_record(status, meta, now);
            inner.history.push_front(record.clone());
            inner.history.truncate(HISTORY_CAP);
            if record.cost_usd.is_some_and(|cost| cost > 0.0) {
                Self::push_spend(&mut inner, now, record.cost_usd.unwrap_or_default());
            }
            (record, activities)
        };

        let store = self.store.lock().clone();
        if let Some(store) = store {
            if let Err(err) = store.insert_run(&record) {
                tracing::error!(run_id = %record.id, error = %err, "failed to persist run");
            }
            if let Err(err) = store.insert_activities(record.id.as_str(), &activities) {
                tracing::error!(run_id = %record.id, error = %err, "failed to persist activities");
            }
            if let Some(messages) = raw_messages {
                let blob = Value::Array(messages.to_vec()).to_string();
                if let Err(err) = store.save_transcript(record.id.as_str(), &blob, now) {
                    tracing::error!(run_id = %record.id, error = %err, "failed to persist transcript");
                }
            }
        }
        Some(record)
    }

    pub fn running_count(&self) -> usize {
        self.inner.lock().agents.len()
    }

    pub fn has_live_ticket(&self, ticket_id: &str) -> bool {
        self.inner
            .lock()
            .agents
            .values()
            .any(|agent| agent.ticket_id == ticket_id)
    }

    pub fn live_agents(&self) -> Vec<LiveAgent> {
        self.inner.lock().agents.values().cloned().collect()
    }

    pub fn history(&self) -> Vec<RunRecord> {
        self.inner.lock().history.iter().cloned().collect()
    }

    // === Queue / pause ===

    pub fn update_queue(&self, ready: usize, in_progress: usize) {
        let now = self.clock.epoch_ms();
        self.inner.lock().queue = QueueSnapshot {
            ready,
            in_progress,
            last_checked_at_ms: now,
        };
    }

    pub fn queue(&self) -> QueueSnapshot {
        self.inner.lock().queue.clone()
    }

    pub fn toggle_pause(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.paused = !inner.paused;
        inner.paused
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    // === Per-ticket failure counters ===

    pub fn increment_issue_failures(&self, ticket_id: &str) -> u32 {
        let mut inner = self.inner.lock();
        if !inner.failures.contains_key(ticket_id) && inner.failures.len() >= FAILURE_MAP_CAP {
            inner.failures.shift_remove_index(0);
        }
        let count = inner.failures.entry(ticket_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn issue_failure_count(&self, ticket_id: &str) -> u32 {
        self.inner.lock().failures.get(ticket_id).copied().unwrap_or(0)
    }

    pub fn clear_issue_failures(&self, ticket_id: &str) {
        self.inner.lock().failures.shift_remove(ticket_id);
    }

    // === Spend / budget ===

    pub fn add_spend(&self, cost_usd: f64) {
        if cost_usd <= 0.0 {
            return;
        }
        let now = self.clock.epoch_ms();
        Self::push_spend(&mut self.inner.lock(), now, cost_usd);
    }

    fn push_spend(inner: &mut StateInner, now_ms: u64, cost_usd: f64) {
        let cutoff = now_ms.saturating_sub(SPEND_RETENTION_DAYS * 24 * 60 * 60 * 1000);
        while inner.spend.front().is_some_and(|entry| entry.timestamp_ms < cutoff) {
            inner.spend.pop_front();
        }
        inner.spend.push_back(SpendEntry {
            timestamp_ms: now_ms,
            cost_usd,
        });
    }

    /// Total spend for the current UTC day.
    pub fn daily_spend(&self) -> f64 {
        spend_for_day(&self.inner.lock().spend, self.clock.epoch_ms())
    }

    /// Total spend for the current UTC calendar month.
    pub fn monthly_spend(&self) -> f64 {
        spend_for_month(&self.inner.lock().spend, self.clock.epoch_ms())
    }

    /// Should the executor dispatch at all, given configured limits?
    pub fn check_budget(&self, budget: &BudgetSection) -> BudgetVerdict {
        if budget.daily_limit_usd > 0.0 {
            let daily = self.daily_spend();
            if daily >= budget.daily_limit_usd {
                return BudgetVerdict::exceeded(format!(
                    "daily budget exhausted: ${daily:.2} of ${:.2}",
                    budget.daily_limit_usd
                ));
            }
        }
        if budget.monthly_limit_usd > 0.0 {
            let monthly = self.monthly_spend();
            if monthly >= budget.monthly_limit_usd {
                return BudgetVerdict::exceeded(format!(
                    "monthly budget exhausted: ${monthly:.2} of ${:.2}",
                    budget.monthly_limit_usd
                ));
            }
        }
        BudgetVerdict::ok()
    }

    /// A warning once spend crosses the configured percent of a limit.
    pub fn budget_warning(&self, budget: &BudgetSection) -> Option<String> {
        if budget.warn_at_percent == 0 {
            return None;
        }
        let threshold = budget.warn_at_percent as f64 / 100.0;
        if budget.daily_limit_usd > 0.0 {
            let daily = self.daily_spend();
            if daily >= budget.daily_limit_usd * threshold {
                return Some(format!(
                    "daily spend ${daily:.2} is {:.0}% of the ${:.2} limit",
                    daily / budget.daily_limit_usd * 100.0,
                    budget.daily_limit_usd
                ));
            }
        }
        if budget.monthly_limit_usd > 0.0 {
            let monthly = self.monthly_spend();
            if monthly >= budget.monthly_limit_usd * threshold {
                return Some(format!(
                    "monthly spend ${monthly:.2} is {:.0}% of the ${:.2} limit",
                    monthly / budget.monthly_limit_usd * 100.0,
                    budget.monthly_limit_usd
                ));
            }
        }
        None
    }

    // === Pass snapshots ===

    pub fn update_planning(&self, update: impl FnOnce(&mut PassStatus)) {
        update(&mut self.inner.lock().planning);
    }

    pub fn update_reviewer(&self, update: impl FnOnce(&mut PassStatus)) {
        update(&mut self.inner.lock().reviewer);
    }

    pub fn planning(&self) -> PassStatus {
        self.inner.lock().planning.clone()
    }

    pub fn reviewer(&self) -> PassStatus {
        self.inner.lock().reviewer.clone()
    }

    /// Full status snapshot for dashboards and the IPC surface.
    pub fn to_json(&self) -> Value {
        let now = self.clock.epoch_ms();
        let inner = self.inner.lock();
        json!({
            "agents": inner.agents.values().collect::<Vec<_>>(),
            "history": &inner.history,
            "queue": &inner.queue,
            "paused": inner.paused,
            "planning": &inner.planning,
            "reviewer": &inner.reviewer,
            "spend": {
                "daily_usd": spend_for_day(&inner.spend, now),
                "monthly_usd": spend_for_month(&inner.spend, now),
            },
            "api_health": self.breakers.snapshot(now),
        })
    }
}

fn utc_day(epoch_ms: u64) -> (i32, u32, u32) {
    let dt = Utc
        .timestamp_millis_opt(epoch_ms as i64)
        .single()
        .unwrap_or_default();
    (dt.year(), dt.month(), dt.day())
}

fn utc_month(epoch_ms: u64) -> (i32, u32) {
    let dt = Utc
        .timestamp_millis_opt(epoch_ms as i64)
        .single()
        .unwrap_or_default();
    (dt.year(), dt.month())
}

fn spend_for_day(spend: &VecDeque<SpendEntry>, now_ms: u64) -> f64 {
    let today = utc_day(now_ms);
    spend
        .iter()
        .filter(|entry| utc_day(entry.timestamp_ms) == today)
        .map(|entry| entry.cost_usd)
        .sum()
}

fn spend_for_month(spend: &VecDeque<SpendEntry>, now_ms: u64) -> f64 {
    let month = utc_month(now_ms);
    spend
        .iter()
        .filter(|entry| utc_month(entry.timestamp_ms) == month)
        .map(|entry| entry.cost_usd)
        .sum()
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
