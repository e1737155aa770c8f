// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External collaborator adapters.
//!
//! The engine consumes three narrow contracts: [`Tracker`] (the issue
//! tracker), [`CodeHost`] (pull requests and CI), and [`AgentSdk`] (spawn a
//! coding-agent process that streams JSON messages). This crate holds those
//! traits, the production implementations (Linear GraphQL, GitHub REST, the
//! `claude` CLI), and fakes for tests behind the `test-support` feature.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod agent;
pub mod claude;
pub mod codehost;
pub mod error;
pub mod github;
pub mod linear;
pub mod subprocess;
pub mod tracker;

pub use agent::{AgentSdk, AgentSdkError, AgentSpawnConfig};
pub use claude::ClaudeSdk;
pub use codehost::{aggregate_ci, parse_pr_url, CheckRun, CiStatus, CodeHost, PrStatus};
pub use error::{RemoteError, RemoteKind};
pub use github::GitHubClient;
pub use linear::LinearClient;
pub use tracker::{ReviewTicket, Tracker};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentSdk, FakeCodeHost, FakeTracker, ScriptedRun, TrackerCall};
