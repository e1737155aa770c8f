// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_validate() {
    Config::default().validate().unwrap();
}

#[yare::parameterized(
    one   = { 1, true },
    fifty = { 50, true },
    zero  = { 0, false },
    over  = { 51, false },
)]
fn parallel_bounds(parallel: u32, ok: bool) {
    let mut config = Config::default();
    config.executor.parallel = parallel;
    assert_eq!(config.validate().is_ok(), ok);
}

#[yare::parameterized(
    half_minute = { 0.5, true },
    hour        = { 60.0, true },
    too_small   = { 0.4, false },
    too_large   = { 61.0, false },
)]
fn poll_interval_bounds(minutes: f64, ok: bool) {
    let mut config = Config::default();
    config.executor.poll_interval_minutes = minutes;
    assert_eq!(config.validate().is_ok(), ok);
}

#[yare::parameterized(
    zero    = { 0, true },
    hundred = { 100, true },
    over    = { 101, false },
)]
fn warn_at_percent_bounds(percent: u32, ok: bool) {
    let mut config = Config::default();
    config.budget.warn_at_percent = percent;
    assert_eq!(config.validate().is_ok(), ok);
}

#[yare::parameterized(
    disabled  = { 0, true },
    one       = { 1, true },
    max       = { 480, true },
    too_large = { 481, false },
)]
fn timeout_zero_disables(minutes: u32, ok: bool) {
    let mut config = Config::default();
    config.executor.timeout_minutes = minutes;
    assert_eq!(config.validate().is_ok(), ok);
}

#[test]
fn retries_bounds() {
    let mut config = Config::default();
    config.executor.max_retries = 20;
    config.validate().unwrap();
    config.executor.max_retries = 21;
    assert!(config.validate().is_err());
}

#[test]
fn newline_in_string_is_rejected() {
    let mut config = Config::default();
    config.linear.team = "Eng\nOps".into();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidString { .. })
    ));
}

#[test]
fn overlong_string_is_rejected() {
    let mut config = Config::default();
    config.executor.model = "m".repeat(201);
    assert!(config.validate().is_err());
    config.executor.model = "m".repeat(200);
    config.validate().unwrap();
}

#[test]
fn list_entries_are_validated() {
    let mut config = Config::default();
    config.linear.labels = vec!["ok".into(), "bad\nlabel".into()];
    assert!(config.validate().is_err());
}

#[test]
fn load_parses_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[linear]
team = "ENG"

[executor]
parallel = 4
poll_interval_minutes = 2.5

[budget]
daily_limit_usd = 25.0
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.linear.team, "ENG");
    assert_eq!(config.executor.parallel, 4);
    assert_eq!(config.executor.poll_interval_minutes, 2.5);
    assert_eq!(config.budget.daily_limit_usd, 25.0);
    // untouched sections keep defaults
    assert_eq!(config.executor.max_retries, 3);
    assert_eq!(config.linear.states.ready, "Ready");
}

#[test]
fn load_rejects_out_of_range_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[executor]\nparallel = 99\n").unwrap();
    assert!(Config::load(&path).is_err());
}

#[test]
fn state_names_map_to_workflow_states() {
    let names = WorkflowStateNames::default();
    assert_eq!(names.name_for(WorkflowState::Ready), "Ready");
    assert_eq!(names.name_for(WorkflowState::InReview), "In Review");
    assert_eq!(names.name_for(WorkflowState::Blocked), "Blocked");
}
