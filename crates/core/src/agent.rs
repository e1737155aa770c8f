// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent run records: live, in-memory agents and their persisted form.

use crate::activity::{ActivityEntry, ACTIVITY_CAP};
use crate::id::RunId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Status of an agent run, live or finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "timed_out" => Some(Self::TimedOut),
            _ => None,
        }
    }

    /// Finished, one way or another.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an agent run was spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunType {
    Executor,
    Fixer,
    Review,
    Planning,
    ProjectOwner,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executor => "executor",
            Self::Fixer => "fixer",
            Self::Review => "review",
            Self::Planning => "planning",
            Self::ProjectOwner => "project-owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "executor" => Some(Self::Executor),
            "fixer" => Some(Self::Fixer),
            "review" => Some(Self::Review),
            "planning" => Some(Self::Planning),
            "project-owner" => Some(Self::ProjectOwner),
            _ => None,
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an agent run ended, as observed by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Success,
    Timeout,
    Inactivity,
    Error,
    Aborted,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::Inactivity => "inactivity",
            Self::Error => "error",
            Self::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "timeout" => Some(Self::Timeout),
            "inactivity" => Some(Self::Inactivity),
            "error" => Some(Self::Error),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional completion metadata attached when an agent finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<ExitReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_type: Option<RunType>,
}

/// A currently running agent tracked in application state.
///
/// Invariant: everything in the live set has status [`AgentStatus::Running`];
/// completion moves the agent into history atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveAgent {
    pub id: RunId,
    pub ticket_id: String,
    pub ticket_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_issue_id: Option<String>,
    pub started_at_ms: u64,
    pub status: AgentStatus,
    /// Bounded trace, most recent [`ACTIVITY_CAP`] entries.
    pub activities: VecDeque<ActivityEntry>,
}

impl LiveAgent {
    pub fn new(
        id: RunId,
        ticket_id: impl Into<String>,
        ticket_title: impl Into<String>,
        tracker_issue_id: Option<String>,
        started_at_ms: u64,
    ) -> Self {
        Self {
            id,
            ticket_id: ticket_id.into(),
            ticket_title: ticket_title.into(),
            tracker_issue_id,
            started_at_ms,
            status: AgentStatus::Running,
            activities: VecDeque::new(),
        }
    }

    /// Append an activity, dropping the oldest entry beyond the cap.
    pub fn push_activity(&mut self, entry: ActivityEntry) {
        if self.activities.len() == ACTIVITY_CAP {
            self.activities.pop_front();
        }
        self.activities.push_back(entry);
    }

    /// Convert into the persisted record form at completion.
    pub fn into_record(self, status: AgentStatus, meta: RunMeta, finished_at_ms: u64) -> RunRecord {
        RunRecord {
            id: self.id,
            ticket_id: self.ticket_id,
            ticket_title: self.ticket_title,
            tracker_issue_id: self.tracker_issue_id,
            status,
            started_at_ms: self.started_at_ms,
            finished_at_ms,
            cost_usd: meta.cost_usd,
            duration_ms: meta.duration_ms,
            num_turns: meta.num_turns,
            error: meta.error,
            session_id: meta.session_id,
            exit_reason: meta.exit_reason,
            run_type: meta.run_type.unwrap_or(RunType::Executor),
            reviewed_at_ms: None,
        }
    }
}

/// A finished agent run as persisted to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub ticket_id: String,
    pub ticket_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_issue_id: Option<String>,
    pub status: AgentStatus,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<ExitReason>,
    pub run_type: RunType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at_ms: Option<u64>,
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
