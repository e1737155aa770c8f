// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket references and tracker workflow states.
//!
//! The tracker is the source of truth for every ticket field; the core only
//! carries the identifier, title, and the priority/age used for scheduling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit of work in the external tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRef {
    /// Opaque tracker id (UUID on Linear).
    pub id: String,
    /// Human identifier, e.g. "ENG-12".
    pub identifier: String,
    pub title: String,
    /// Tracker priority; lower values are more urgent, 0 means unset.
    pub priority: i64,
    /// Epoch milliseconds when the ticket was created, for age ordering.
    #[serde(default)]
    pub created_at_ms: u64,
}

/// Workflow states the orchestrator drives tickets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Triage,
    Ready,
    InProgress,
    InReview,
    Done,
    Blocked,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 6] = [
        Self::Triage,
        Self::Ready,
        Self::InProgress,
        Self::InReview,
        Self::Done,
        Self::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
