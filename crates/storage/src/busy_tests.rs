// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn busy_error() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("database is locked".into()),
    )
}

fn other_error() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
        Some("constraint failed".into()),
    )
}

#[test]
fn busy_codes_are_detected() {
    assert!(is_busy(&busy_error()));
    assert!(!is_busy(&other_error()));
    assert!(!is_busy(&rusqlite::Error::QueryReturnedNoRows));
}

#[test]
fn busy_message_without_code_is_detected() {
    let err = rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some("SQLITE_BUSY: snapshot in progress".into()),
    );
    assert!(is_busy(&err));
}

#[test]
fn transient_busy_is_retried_until_success() {
    let mut calls = 0;
    let result = busy_retry("test", String::new, || {
        calls += 1;
        if calls < 3 {
            Err(busy_error())
        } else {
            Ok(42)
        }
    });
    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls, 3);
}

#[test]
fn exhausted_busy_propagates_after_five_attempts() {
    let mut calls = 0;
    let result: Result<(), _> = busy_retry("test", || "payload".into(), || {
        calls += 1;
        Err(busy_error())
    });
    assert!(result.is_err());
    assert_eq!(calls, 5);
}

#[test]
fn non_busy_error_is_not_retried() {
    let mut calls = 0;
    let result: Result<(), _> = busy_retry("test", || "payload".into(), || {
        calls += 1;
        Err(other_error())
    });
    assert!(result.is_err());
    assert_eq!(calls, 1);
}

#[test]
fn backoff_is_capped() {
    for attempt in 1..=10 {
        assert!(backoff_ms(attempt) <= 2_000);
    }
}
