// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema creation and additive migrations.
//!
//! The base tables are created with `IF NOT EXISTS`; columns added later
//! ship as `ALTER TABLE … ADD COLUMN` statements whose duplicate-column
//! failure is swallowed. Running the migration any number of times on any
//! vintage of database yields the same schema. Column names and types are
//! the compatibility contract and are frozen.

use rusqlite::Connection;

const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agent_runs (
    id            TEXT PRIMARY KEY,
    ticket_id     TEXT NOT NULL,
    ticket_title  TEXT NOT NULL,
    status        TEXT NOT NULL,
    started_at    INTEGER NOT NULL,
    finished_at   INTEGER NOT NULL,
    cost_usd      REAL,
    duration_ms   INTEGER,
    num_turns     INTEGER,
    error         TEXT
);

CREATE TABLE IF NOT EXISTS activity_logs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_run_id  TEXT NOT NULL,
    timestamp     INTEGER NOT NULL,
    type          TEXT NOT NULL,
    summary       TEXT NOT NULL,
    detail        TEXT
);

CREATE TABLE IF NOT EXISTS conversation_log (
    agent_run_id  TEXT PRIMARY KEY,
    content       TEXT NOT NULL,
    created_at    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS oauth_tokens (
    service       TEXT PRIMARY KEY,
    access_token  TEXT NOT NULL,
    refresh_token TEXT,
    expires_at    INTEGER NOT NULL,
    token_type    TEXT NOT NULL,
    scope         TEXT,
    actor         TEXT
);

CREATE TABLE IF NOT EXISTS planning_sessions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id        TEXT NOT NULL,
    started_at    INTEGER NOT NULL,
    finished_at   INTEGER,
    status        TEXT NOT NULL,
    cost_usd      REAL
);

CREATE INDEX IF NOT EXISTS idx_agent_runs_finished_at ON agent_runs(finished_at);
CREATE INDEX IF NOT EXISTS idx_activity_logs_agent_run_id ON activity_logs(agent_run_id);
";

/// Columns added after the initial release, one idempotent ALTER each.
const ADDED_COLUMNS: &[(&str, &str)] = &[
    ("agent_runs", "linear_issue_id TEXT"),
    ("agent_runs", "session_id TEXT"),
    ("agent_runs", "reviewed_at INTEGER"),
    ("agent_runs", "exit_reason TEXT"),
    ("agent_runs", "run_type TEXT"),
    ("activity_logs", "is_subagent INTEGER NOT NULL DEFAULT 0"),
    ("oauth_tokens", "updated_at INTEGER NOT NULL DEFAULT 0"),
];

/// Bring a connection's schema up to date.
pub(crate) fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(BASE_SCHEMA)?;
    for (table, column) in ADDED_COLUMNS {
        add_column(conn, table, column)?;
    }
    Ok(())
}

/// `ALTER TABLE … ADD COLUMN`, treating "duplicate column name" as success.
fn add_column(conn: &Connection, table: &str, column: &str) -> Result<(), rusqlite::Error> {
    match conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column}"), []) {
        Ok(_) => Ok(()),
        Err(err) if err.to_string().contains("duplicate column name") => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
