// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration surface.
//!
//! Loaded once at startup from `.autopilot/config.toml` under the project
//! root. Every documented range is enforced by [`Config::validate`]; string
//! fields are rejected when they contain a newline or exceed 200 characters.

use crate::ticket::WorkflowState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest accepted string config value.
const STRING_MAX: usize = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field}: {reason}")]
    InvalidString { field: String, reason: &'static str },
}

/// Top-level configuration. Every section has defaults so a minimal file
/// only names the tracker team.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub linear: TrackerSection,
    pub executor: ExecutorSection,
    pub monitor: MonitorSection,
    pub github: GithubSection,
    pub persistence: PersistenceSection,
    pub sandbox: SandboxSection,
    pub budget: BudgetSection,
    pub reviewer: ReviewerSection,
    pub planning: PlanningSection,
    pub projects: ProjectsSection,
}

/// Issue-tracker scoping and workflow-state names, resolved to ids once at
/// startup by the tracker client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    pub team: String,
    pub initiative: String,
    pub labels: Vec<String>,
    pub projects: Vec<String>,
    pub states: WorkflowStateNames,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            team: String::new(),
            initiative: String::new(),
            labels: Vec::new(),
            projects: Vec::new(),
            states: WorkflowStateNames::default(),
        }
    }
}

/// Human-readable tracker state names for each workflow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowStateNames {
    pub triage: String,
    pub ready: String,
    pub in_progress: String,
    pub in_review: String,
    pub done: String,
    pub blocked: String,
}

impl Default for WorkflowStateNames {
    fn default() -> Self {
        Self {
            triage: "Triage".into(),
            ready: "Ready".into(),
            in_progress: "In Progress".into(),
            in_review: "In Review".into(),
            done: "Done".into(),
            blocked: "Blocked".into(),
        }
    }
}

impl WorkflowStateNames {
    pub fn name_for(&self, state: WorkflowState) -> &str {
        match state {
            WorkflowState::Triage => &self.triage,
            WorkflowState::Ready => &self.ready,
            WorkflowState::InProgress => &self.in_progress,
            WorkflowState::InReview => &self.in_review,
            WorkflowState::Done => &self.done,
            WorkflowState::Blocked => &self.blocked,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Concurrent agent slots, 1..=50.
    pub parallel: u32,
    /// Overall agent timeout in minutes, 1..=480; 0 disables.
    pub timeout_minutes: u32,
    /// Fixer agent timeout in minutes, 1..=480; 0 disables.
    pub fixer_timeout_minutes: u32,
    /// Fixer spawns allowed per ticket, 0..=20.
    pub max_fixer_attempts: u32,
    /// Failed runs tolerated before a ticket is blocked, 0..=20.
    pub max_retries: u32,
    /// Watchdog reset on every streamed activity, 1..=120 minutes; 0 disables.
    pub inactivity_timeout_minutes: u32,
    /// Main-loop tick interval, 0.5..=60 minutes.
    pub poll_interval_minutes: f64,
    /// Age after which an in-progress ticket is considered stale.
    pub stale_timeout_minutes: u32,
    pub auto_approve_labels: Vec<String>,
    pub branch_pattern: String,
    pub commit_pattern: String,
    pub model: String,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            parallel: 2,
            timeout_minutes: 30,
            fixer_timeout_minutes: 20,
            max_fixer_attempts: 3,
            max_retries: 3,
            inactivity_timeout_minutes: 10,
            poll_interval_minutes: 5.0,
            stale_timeout_minutes: 120,
            auto_approve_labels: Vec::new(),
            branch_pattern: "autopilot-{identifier}".into(),
            commit_pattern: "{identifier}: {title}".into(),
            model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub respond_to_reviews: bool,
    pub review_responder_timeout_minutes: u32,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            respond_to_reviews: false,
            review_responder_timeout_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubSection {
    /// "owner/repo" override; derived from the git remote when empty.
    pub repo: String,
    pub automerge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSection {
    pub enabled: bool,
    /// Database file; defaults to `.autopilot/autopilot.db` under the project.
    pub db_path: Option<PathBuf>,
    /// Days to keep activity and transcript rows.
    pub retention_days: u32,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    pub enabled: bool,
    pub auto_allow_bash: bool,
    pub network_restricted: bool,
    pub extra_allowed_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSection {
    /// USD per UTC day; 0 disables.
    pub daily_limit_usd: f64,
    /// USD per UTC calendar month; 0 disables.
    pub monthly_limit_usd: f64,
    /// USD per single agent run; 0 disables.
    pub per_agent_limit_usd: f64,
    /// Warn when spend crosses this percent of a limit, 0..=100.
    pub warn_at_percent: u32,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            daily_limit_usd: 0.0,
            monthly_limit_usd: 0.0,
            per_agent_limit_usd: 0.0,
            warn_at_percent: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerSection {
    pub enabled: bool,
    /// Minutes between review passes.
    pub interval_minutes: f64,
    /// Unreviewed runs handled per pass.
    pub batch_size: u32,
    pub timeout_minutes: u32,
    pub model: String,
}

impl Default for ReviewerSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 60.0,
            batch_size: 10,
            timeout_minutes: 15,
            model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningSection {
    pub enabled: bool,
    /// Minutes between planning passes.
    pub interval_minutes: f64,
    /// Run planning only while the ready queue is at or below this size.
    pub ready_threshold: u32,
    pub timeout_minutes: u32,
    pub model: String,
}

impl Default for PlanningSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 120.0,
            ready_threshold: 2,
            timeout_minutes: 20,
            model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectsSection {
    pub enabled: bool,
    /// Minutes between project-owner passes.
    pub interval_minutes: f64,
    pub timeout_minutes: u32,
    pub model: String,
}

impl Default for ProjectsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 240.0,
            timeout_minutes: 20,
            model: String::new(),
        }
    }
}

impl Config {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Enforce every documented range and string constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        range("executor.parallel", self.executor.parallel as f64, 1.0, 50.0)?;
        zero_or_range("executor.timeout_minutes", self.executor.timeout_minutes, 1, 480)?;
        zero_or_range(
            "executor.fixer_timeout_minutes",
            self.executor.fixer_timeout_minutes,
            1,
            480,
        )?;
        range(
            "executor.max_fixer_attempts",
            self.executor.max_fixer_attempts as f64,
            0.0,
            20.0,
        )?;
        range("executor.max_retries", self.executor.max_retries as f64, 0.0, 20.0)?;
        zero_or_range(
            "executor.inactivity_timeout_minutes",
            self.executor.inactivity_timeout_minutes,
            1,
            120,
        )?;
        range(
            "executor.poll_interval_minutes",
            self.executor.poll_interval_minutes,
            0.5,
            60.0,
        )?;
        range("budget.daily_limit_usd", self.budget.daily_limit_usd, 0.0, f64::MAX)?;
        range("budget.monthly_limit_usd", self.budget.monthly_limit_usd, 0.0, f64::MAX)?;
        range(
            "budget.per_agent_limit_usd",
            self.budget.per_agent_limit_usd,
            0.0,
            f64::MAX,
        )?;
        range("budget.warn_at_percent", self.budget.warn_at_percent as f64, 0.0, 100.0)?;

        for (field, value) in self.string_fields() {
            check_string(&field, value)?;
        }
        Ok(())
    }

    /// Every string-valued option, flattened for validation.
    fn string_fields(&self) -> Vec<(String, &str)> {
        let mut fields: Vec<(String, &str)> = vec![
            ("linear.team".into(), &self.linear.team),
            ("linear.initiative".into(), &self.linear.initiative),
            ("linear.states.triage".into(), &self.linear.states.triage),
            ("linear.states.ready".into(), &self.linear.states.ready),
            ("linear.states.in_progress".into(), &self.linear.states.in_progress),
            ("linear.states.in_review".into(), &self.linear.states.in_review),
            ("linear.states.done".into(), &self.linear.states.done),
            ("linear.states.blocked".into(), &self.linear.states.blocked),
            ("executor.branch_pattern".into(), &self.executor.branch_pattern),
            ("executor.commit_pattern".into(), &self.executor.commit_pattern),
            ("executor.model".into(), &self.executor.model),
            ("github.repo".into(), &self.github.repo),
            ("reviewer.model".into(), &self.reviewer.model),
            ("planning.model".into(), &self.planning.model),
            ("projects.model".into(), &self.projects.model),
        ];
        for (i, label) in self.linear.labels.iter().enumerate() {
            fields.push((format!("linear.labels[{i}]"), label));
        }
        for (i, project) in self.linear.projects.iter().enumerate() {
            fields.push((format!("linear.projects[{i}]"), project));
        }
        for (i, label) in self.executor.auto_approve_labels.iter().enumerate() {
            fields.push((format!("executor.auto_approve_labels[{i}]"), label));
        }
        for (i, domain) in self.sandbox.extra_allowed_domains.iter().enumerate() {
            fields.push((format!("sandbox.extra_allowed_domains[{i}]"), domain));
        }
        fields
    }
}

fn range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn zero_or_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ConfigError> {
    if value == 0 {
        return Ok(());
    }
    range(field, value as f64, min as f64, max as f64)
}

fn check_string(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.contains('\n') {
        return Err(ConfigError::InvalidString {
            field: field.to_string(),
            reason: "must not contain newlines",
        });
    }
    if value.chars().count() > STRING_MAX {
        return Err(ConfigError::InvalidString {
            field: field.to_string(),
            reason: "exceeds 200 characters",
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
