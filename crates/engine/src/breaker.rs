// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service circuit breakers.
//!
//! Each remote service gets a rolling window of failure timestamps. Once
//! the window holds the threshold, the breaker opens and calls fail without
//! touching the network. After the cooldown one probe call is admitted;
//! its outcome closes or re-opens the breaker. The registry is an owned,
//! injectable value, never an ambient global, and resets for tests.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

/// Remote services protected by independent breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    IssueTracker,
    CodeHost,
}

impl Service {
    pub const ALL: [Service; 2] = [Self::IssueTracker, Self::CodeHost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IssueTracker => "issue-tracker",
            Self::CodeHost => "code-host",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Externally observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

/// What the breaker decided for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed; call normally.
    Proceed,
    /// Breaker cooling down; this caller is the single recovery probe.
    Probe,
    /// Breaker open; fail without calling.
    Reject,
}

#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Rolling failure window.
    pub window_ms: u64,
    /// Failures within the window that open the breaker.
    pub failure_threshold: usize,
    /// Time the breaker stays open before admitting a probe.
    pub cooldown_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            failure_threshold: 10,
            cooldown_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Closed,
    Open { opened_at_ms: u64, probing: bool },
}

#[derive(Debug)]
struct ServiceBreaker {
    failures: VecDeque<u64>,
    phase: Phase,
}

impl ServiceBreaker {
    fn new() -> Self {
        Self {
            failures: VecDeque::new(),
            phase: Phase::Closed,
        }
    }
}

/// One breaker per [`Service`], independent of each other.
pub struct BreakerRegistry {
    settings: BreakerSettings,
    services: Mutex<HashMap<Service, ServiceBreaker>>,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            services: Mutex::new(HashMap::new()),
        }
    }

    /// Current state; lazily reports `HalfOpen` once the cooldown elapsed.
    pub fn state(&self, service: Service, now_ms: u64) -> BreakerState {
        let mut services = self.services.lock();
        let breaker = services.entry(service).or_insert_with(ServiceBreaker::new);
        match breaker.phase {
            Phase::Closed => BreakerState::Closed,
            Phase::Open { opened_at_ms, .. } => {
                if now_ms.saturating_sub(opened_at_ms) >= self.settings.cooldown_ms {
                    BreakerState::HalfOpen
                } else {
                    BreakerState::Open
                }
            }
        }
    }

    pub fn is_open(&self, service: Service, now_ms: u64) -> bool {
        self.state(service, now_ms) == BreakerState::Open
    }

    /// Decide whether a call may go out. In `HalfOpen` the first caller
    /// takes the probe slot; everyone else is rejected until it finishes.
    pub fn admit(&self, service: Service, now_ms: u64) -> Admission {
        let mut services = self.services.lock();
        let breaker = services.entry(service).or_insert_with(ServiceBreaker::new);
        match &mut breaker.phase {
            Phase::Closed => Admission::Proceed,
            Phase::Open { opened_at_ms, probing } => {
                let cooled = now_ms.saturating_sub(*opened_at_ms) >= self.settings.cooldown_ms;
                if cooled && !*probing {
                    *probing = true;
                    Admission::Probe
                } else {
                    Admission::Reject
                }
            }
        }
    }

    /// A call succeeded. Closes the breaker after a successful probe;
    /// a success while closed leaves the failure window untouched.
    pub fn record_success(&self, service: Service) {
        let mut services = self.services.lock();
        let breaker = services.entry(service).or_insert_with(ServiceBreaker::new);
        if matches!(breaker.phase, Phase::Open { .. }) {
            breaker.phase = Phase::Closed;
            breaker.failures.clear();
        }
    }

    /// A transient failure. A failed probe re-opens with a fresh cooldown;
    /// otherwise the failure lands in the rolling window and may open the
    /// breaker.
    pub fn record_failure(&self, service: Service, now_ms: u64) {
        let mut services = self.services.lock();
        let breaker = services.entry(service).or_insert_with(ServiceBreaker::new);
        match &mut breaker.phase {
            Phase::Open { opened_at_ms, probing } => {
                if *probing {
                    *opened_at_ms = now_ms;
                    *probing = false;
                }
            }
            Phase::Closed => {
                let cutoff = now_ms.saturating_sub(self.settings.window_ms);
                while breaker.failures.front().is_some_and(|at| *at < cutoff) {
                    breaker.failures.pop_front();
                }
                breaker.failures.push_back(now_ms);
                if breaker.failures.len() >= self.settings.failure_threshold {
                    breaker.phase = Phase::Open {
                        opened_at_ms: now_ms,
                        probing: false,
                    };
                    breaker.failures.clear();
                }
            }
        }
    }

    /// Release a probe slot without deciding the breaker's fate. Used when
    /// the probe hit a fatal (non-transient) error that must not count
    /// either way.
    pub fn abandon_probe(&self, service: Service) {
        let mut services = self.services.lock();
        if let Some(breaker) = services.get_mut(&service) {
            if let Phase::Open { probing, .. } = &mut breaker.phase {
                *probing = false;
            }
        }
    }

    /// Per-service states for status snapshots.
    pub fn snapshot(&self, now_ms: u64) -> BTreeMap<&'static str, BreakerState> {
        Service::ALL
            .iter()
            .map(|service| (service.as_str(), self.state(*service, now_ms)))
            .collect()
    }

    /// Forget everything. Tests only.
    pub fn reset(&self) {
        self.services.lock().clear();
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
