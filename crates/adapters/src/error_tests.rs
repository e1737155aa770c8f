// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    rate_limited   = { RemoteError::http(429, "slow down"), true },
    server_error   = { RemoteError::http(500, "boom"), true },
    bad_gateway    = { RemoteError::http(502, "bad gateway"), true },
    client_error   = { RemoteError::http(418, "teapot"), false },
    auth           = { RemoteError::auth("bad token"), false },
    not_found      = { RemoteError::not_found("no such issue"), false },
    invalid_input  = { RemoteError::invalid_input("bad state id"), false },
    conn_reset     = { RemoteError::network("connection reset by peer"), true },
    fetch_failed   = { RemoteError::other("fetch failed mid-body"), true },
    timed_out_msg  = { RemoteError::other("request timed out"), true },
    opaque_other   = { RemoteError::other("schema mismatch"), false },
)]
fn transient_classification(err: RemoteError, transient: bool) {
    assert_eq!(err.is_transient(), transient);
}

#[yare::parameterized(
    auth      = { RemoteError::auth("x"), true },
    not_found = { RemoteError::not_found("x"), true },
    invalid   = { RemoteError::invalid_input("x"), true },
    http      = { RemoteError::http(500, "x"), false },
    network   = { RemoteError::network("x"), false },
)]
fn fatal_classification(err: RemoteError, fatal: bool) {
    assert_eq!(err.is_fatal(), fatal);
}

#[yare::parameterized(
    unauthorized = { 401, RemoteKind::Auth },
    forbidden    = { 403, RemoteKind::Auth },
    missing      = { 404, RemoteKind::NotFound },
    bad_request  = { 400, RemoteKind::InvalidInput },
    unprocessable = { 422, RemoteKind::InvalidInput },
    rate_limited = { 429, RemoteKind::Http },
    server       = { 503, RemoteKind::Http },
)]
fn status_mapping(status: u16, kind: RemoteKind) {
    assert_eq!(error_for_status(status, None, "detail").kind, kind);
}

#[test]
fn retry_after_is_attached() {
    let err = error_for_status(429, Some(7_000), "rate limited");
    assert_eq!(err.retry_after_ms, Some(7_000));
    assert!(err.is_transient());
}

#[test]
fn parse_retry_after_seconds() {
    assert_eq!(parse_retry_after("30", 0), Some(30_000));
    assert_eq!(parse_retry_after(" 5 ", 0), Some(5_000));
}

#[test]
fn parse_retry_after_http_date() {
    // 10 seconds after the reference now
    let now_ms = 1_700_000_000_000u64;
    let date = chrono::DateTime::from_timestamp_millis(now_ms as i64 + 10_000)
        .unwrap()
        .to_rfc2822();
    let delay = parse_retry_after(&date, now_ms).unwrap();
    assert!((9_000..=11_000).contains(&delay));
}

#[test]
fn parse_retry_after_garbage_is_none() {
    assert_eq!(parse_retry_after("soon", 0), None);
}

#[test]
fn display_includes_status() {
    let err = RemoteError::http(502, "upstream sad");
    assert_eq!(err.to_string(), "upstream sad (http 502)");
    let err = RemoteError::network("connection reset");
    assert_eq!(err.to_string(), "connection reset");
}
