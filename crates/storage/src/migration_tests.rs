// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn column_names(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .unwrap();
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    names
}

#[test]
fn migrate_twice_is_idempotent() {
    let conn = Connection::open_in_memory().unwrap();
    migrate(&conn).unwrap();
    migrate(&conn).unwrap();
}

#[test]
fn added_columns_exist_after_migration() {
    let conn = Connection::open_in_memory().unwrap();
    migrate(&conn).unwrap();

    let runs = column_names(&conn, "agent_runs");
    for col in ["linear_issue_id", "session_id", "reviewed_at", "exit_reason", "run_type"] {
        assert!(runs.iter().any(|c| c == col), "missing column {col}");
    }
    assert!(column_names(&conn, "activity_logs").iter().any(|c| c == "is_subagent"));
    assert!(column_names(&conn, "oauth_tokens").iter().any(|c| c == "updated_at"));
}

#[test]
fn migrate_upgrades_a_v1_database() {
    // Simulate a database created before the ALTER-added columns existed.
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE agent_runs (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL,
            ticket_title TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER NOT NULL,
            cost_usd REAL,
            duration_ms INTEGER,
            num_turns INTEGER,
            error TEXT
        );",
    )
    .unwrap();

    migrate(&conn).unwrap();
    assert!(column_names(&conn, "agent_runs").iter().any(|c| c == "run_type"));
}

#[test]
fn indices_are_created() {
    let conn = Connection::open_in_memory().unwrap();
    migrate(&conn).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'")
        .unwrap();
    let names: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(names.contains(&"idx_agent_runs_finished_at".to_string()));
    assert!(names.contains(&"idx_activity_logs_agent_run_id".to_string()));
}
