// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared spec-test harness: a real git project, fake collaborators, and a
//! fully wired engine.

use ap_adapters::fake::{FakeAgentSdk, FakeCodeHost, FakeTracker};
use ap_core::{Config, FakeClock};
use ap_engine::clones::CloneManager;
use ap_engine::{AgentRunner, AppState, BreakerRegistry, Executor, Monitor, SpawnGate};
use ap_storage::Store;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

pub fn git(cwd: &Path, args: &[&str]) {
    let status = Command::new("git")
        .current_dir(cwd)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .args(args)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed in {}", cwd.display());
}

pub fn project_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q", "-b", "main"]);
    git(dir.path(), &["config", "user.name", "Spec"]);
    git(dir.path(), &["config", "user.email", "spec@example.com"]);
    std::fs::write(dir.path().join("README.md"), "spec project\n").unwrap();
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "initial"]);
    dir
}

pub struct Harness {
    pub project: tempfile::TempDir,
    pub clock: FakeClock,
    pub tracker: Arc<FakeTracker>,
    pub codehost: Arc<FakeCodeHost>,
    pub sdk: Arc<FakeAgentSdk>,
    pub breakers: Arc<BreakerRegistry>,
    pub state: Arc<AppState<FakeClock>>,
    pub store: Arc<Store>,
    pub executor: Arc<Executor<FakeTracker, FakeAgentSdk, FakeClock>>,
    pub monitor: Arc<Monitor<FakeTracker, FakeCodeHost, FakeAgentSdk, FakeClock>>,
}

pub fn harness(max_parallel: usize) -> Harness {
    let project = project_repo();
    let clock = FakeClock::at_epoch_ms(1_700_000_000_000);
    let tracker = Arc::new(FakeTracker::new());
    let codehost = Arc::new(FakeCodeHost::new());
    let sdk = Arc::new(FakeAgentSdk::new());
    let breakers = Arc::new(BreakerRegistry::default());
    let state = Arc::new(AppState::new(
        clock.clone(),
        max_parallel,
        Arc::clone(&breakers),
    ));
    let store = Arc::new(Store::open_in_memory().unwrap());
    state.attach_store(Arc::clone(&store));

    let runner = Arc::new(AgentRunner::new(
        Arc::clone(&sdk),
        SpawnGate::new(),
        CloneManager::new(project.path()),
        clock.clone(),
    ));
    let executor = Arc::new(Executor::new(
        Arc::clone(&tracker),
        Arc::clone(&runner),
        Arc::clone(&state),
        Arc::clone(&breakers),
        clock.clone(),
        project.path().to_path_buf(),
        Some(Arc::clone(&store)),
    ));
    let monitor = Arc::new(Monitor::new(
        Arc::clone(&tracker),
        Arc::clone(&codehost),
        Arc::clone(&runner),
        Arc::clone(&state),
        Arc::clone(&breakers),
        clock.clone(),
        project.path().to_path_buf(),
    ));

    Harness {
        project,
        clock,
        tracker,
        codehost,
        sdk,
        breakers,
        state,
        store,
        executor,
        monitor,
    }
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.executor.max_retries = 3;
    config.executor.max_fixer_attempts = 3;
    config
}
