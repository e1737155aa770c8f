// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity entries streamed out of a running agent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Most-recent entries retained per agent; older entries are dropped.
pub const ACTIVITY_CAP: usize = 200;

/// Maximum characters in an activity summary.
pub const SUMMARY_MAX: usize = 200;

/// What kind of agent output an activity entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ToolUse,
    Text,
    Result,
    Error,
    Status,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolUse => "tool_use",
            Self::Text => "text",
            Self::Result => "result",
            Self::Error => "error",
            Self::Status => "status",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool_use" => Some(Self::ToolUse),
            "text" => Some(Self::Text),
            "result" => Some(Self::Result),
            "error" => Some(Self::Error),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of an agent's activity trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp_ms: u64,
    pub kind: ActivityKind,
    /// Short human-readable line, at most [`SUMMARY_MAX`] characters.
    pub summary: String,
    /// Full text when the summary was truncated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Set when the entry was produced by a dispatched sub-agent.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_subagent: bool,
}

impl ActivityEntry {
    pub fn new(kind: ActivityKind, summary: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            kind,
            summary: truncate_summary(&summary.into()),
            detail: None,
            is_subagent: false,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn subagent(mut self, is_subagent: bool) -> Self {
        self.is_subagent = is_subagent;
        self
    }
}

/// Truncate to [`SUMMARY_MAX`] characters, respecting char boundaries.
pub fn truncate_summary(s: &str) -> String {
    if s.chars().count() <= SUMMARY_MAX {
        s.to_string()
    } else {
        s.chars().take(SUMMARY_MAX).collect()
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
