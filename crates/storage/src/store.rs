// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The SQLite-backed run store.

use crate::busy::busy_retry;
use crate::migration;
use ap_core::{sanitize, ActivityEntry, ActivityKind, AgentStatus, ExitReason, RunRecord, RunType};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("run not found: {0}")]
    RunNotFound(String),
    #[error("failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

/// Stored OAuth token for one external service, replaced in place on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokenRow {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at_ms: u64,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub updated_at_ms: u64,
}

/// One recorded planning pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningSessionRow {
    pub run_id: String,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
    pub status: String,
    pub cost_usd: Option<f64>,
}

/// Handle to the embedded database. Writes serialize through the connection
/// mutex and the busy-retry layer; the engine shares one `Arc<Store>`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // WAL lets the dashboard read while the orchestrator writes.
        // PRAGMA journal_mode returns a row, so query_row and ignore it.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous = NORMAL", [])?;
        migration::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // === Agent runs ===

    /// Insert or replace a finished run. The error field is sanitized at
    /// this boundary so no stored error ever matches a redaction pattern.
    pub fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let error = run.error.as_deref().map(sanitize);
        let conn = self.conn.lock();
        busy_retry(
            "insert_run",
            || serde_json::to_string(run).unwrap_or_default(),
            || {
                conn.execute(
                    "INSERT OR REPLACE INTO agent_runs (
                        id, ticket_id, ticket_title, status, started_at, finished_at,
                        cost_usd, duration_ms, num_turns, error, linear_issue_id,
                        session_id, reviewed_at, exit_reason, run_type
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        run.id.as_str(),
                        run.ticket_id,
                        run.ticket_title,
                        run.status.as_str(),
                        run.started_at_ms,
                        run.finished_at_ms,
                        run.cost_usd,
                        run.duration_ms,
                        run.num_turns,
                        error,
                        run.tracker_issue_id,
                        run.session_id,
                        run.reviewed_at_ms,
                        run.exit_reason.map(|r| r.as_str()),
                        run.run_type.as_str(),
                    ],
                )
                .map(|_| ())
            },
        )?;
        Ok(())
    }

    /// Append a run's activity trace in one transaction.
    pub fn insert_activities(
        &self,
        run_id: &str,
        entries: &[ActivityEntry],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        busy_retry(
            "insert_activities",
            || format!("run_id={run_id} entries={}", entries.len()),
            || {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO activity_logs
                            (agent_run_id, timestamp, type, summary, detail, is_subagent)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for entry in entries {
                        stmt.execute(params![
                            run_id,
                            entry.timestamp_ms,
                            entry.kind.as_str(),
                            entry.summary,
                            entry.detail,
                            entry.is_subagent,
                        ])?;
                    }
                }
                tx.commit()
            },
        )?;
        Ok(())
    }

    /// A run's activity trace in ascending timestamp order.
    pub fn activities_for_run(&self, run_id: &str) -> Result<Vec<ActivityEntry>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, type, summary, detail, is_subagent
             FROM activity_logs WHERE agent_run_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let entries = stmt
            .query_map([run_id], |row| {
                Ok(ActivityEntry {
                    timestamp_ms: row.get(0)?,
                    kind: ActivityKind::parse(&row.get::<_, String>(1)?)
                        .unwrap_or(ActivityKind::Status),
                    summary: row.get(2)?,
                    detail: row.get(3)?,
                    is_subagent: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Store a run's sanitized transcript blob. Written once at completion.
    pub fn save_transcript(
        &self,
        run_id: &str,
        content: &str,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let content = sanitize(content);
        let conn = self.conn.lock();
        busy_retry(
            "save_transcript",
            || format!("run_id={run_id} bytes={}", content.len()),
            || {
                conn.execute(
                    "INSERT OR REPLACE INTO conversation_log (agent_run_id, content, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![run_id, content, now_ms],
                )
                .map(|_| ())
            },
        )?;
        Ok(())
    }

    /// Newest runs first, by finish time.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{RUN_COLUMNS} ORDER BY finished_at DESC LIMIT ?1"
        ))?;
        let runs = stmt
            .query_map([limit as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// A run row plus its transcript (`None` when no transcript was stored).
    pub fn run_with_transcript(
        &self,
        run_id: &str,
    ) -> Result<(RunRecord, Option<String>), StoreError> {
        let conn = self.conn.lock();
        let run = conn
            .query_row(
                &format!("{RUN_COLUMNS} WHERE id = ?1"),
                [run_id],
                row_to_record,
            )
            .optional()?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        let transcript = conn
            .query_row(
                "SELECT content FROM conversation_log WHERE agent_run_id = ?1",
                [run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok((run, transcript))
    }

    /// Terminal runs not yet reviewed, oldest finish first.
    pub fn unreviewed_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{RUN_COLUMNS}
             WHERE reviewed_at IS NULL
               AND status IN ('completed', 'failed', 'timed_out')
             ORDER BY finished_at ASC LIMIT ?1"
        ))?;
        let runs = stmt
            .query_map([limit as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Mark runs reviewed in one transaction. Empty input is a no-op.
    pub fn mark_runs_reviewed(&self, ids: &[String], now_ms: u64) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock();
        let updated = busy_retry(
            "mark_runs_reviewed",
            || format!("ids={ids:?}"),
            || {
                let tx = conn.transaction()?;
                let mut updated = 0;
                {
                    let mut stmt =
                        tx.prepare("UPDATE agent_runs SET reviewed_at = ?1 WHERE id = ?2")?;
                    for id in ids {
                        updated += stmt.execute(params![now_ms, id])?;
                    }
                }
                tx.commit()?;
                Ok(updated)
            },
        )?;
        Ok(updated)
    }

    // === OAuth tokens ===

    pub fn oauth_token(&self, service: &str) -> Result<Option<OAuthTokenRow>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT access_token, refresh_token, expires_at, token_type, scope, actor,
                        updated_at
                 FROM oauth_tokens WHERE service = ?1",
                [service],
                |row| {
                    Ok(OAuthTokenRow {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                        expires_at_ms: row.get(2)?,
                        token_type: row.get(3)?,
                        scope: row.get(4)?,
                        actor: row.get(5)?,
                        updated_at_ms: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn save_oauth_token(&self, service: &str, token: &OAuthTokenRow) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        busy_retry(
            "save_oauth_token",
            || format!("service={service}"),
            || {
                conn.execute(
                    "INSERT OR REPLACE INTO oauth_tokens
                        (service, access_token, refresh_token, expires_at, token_type, scope,
                         actor, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        service,
                        token.access_token,
                        token.refresh_token,
                        token.expires_at_ms,
                        token.token_type,
                        token.scope,
                        token.actor,
                        token.updated_at_ms,
                    ],
                )
                .map(|_| ())
            },
        )?;
        Ok(())
    }

    /// Delete a token; deleting a missing service is a no-op.
    pub fn delete_oauth_token(&self, service: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        busy_retry(
            "delete_oauth_token",
            || format!("service={service}"),
            || {
                conn.execute("DELETE FROM oauth_tokens WHERE service = ?1", [service])
                    .map(|_| ())
            },
        )?;
        Ok(())
    }

    // === Planning sessions ===

    pub fn insert_planning_session(&self, session: &PlanningSessionRow) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        busy_retry(
            "insert_planning_session",
            || format!("run_id={}", session.run_id),
            || {
                conn.execute(
                    "INSERT INTO planning_sessions
                        (run_id, started_at, finished_at, status, cost_usd)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        session.run_id,
                        session.started_at_ms,
                        session.finished_at_ms,
                        session.status,
                        session.cost_usd,
                    ],
                )
                .map(|_| ())
            },
        )?;
        Ok(())
    }

    pub fn recent_planning_sessions(
        &self,
        limit: usize,
    ) -> Result<Vec<PlanningSessionRow>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT run_id, started_at, finished_at, status, cost_usd
             FROM planning_sessions ORDER BY started_at DESC LIMIT ?1",
        )?;
        let sessions = stmt
            .query_map([limit as i64], |row| {
                Ok(PlanningSessionRow {
                    run_id: row.get(0)?,
                    started_at_ms: row.get(1)?,
                    finished_at_ms: row.get(2)?,
                    status: row.get(3)?,
                    cost_usd: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    // === Retention ===

    /// Delete activity rows older than `days`. Returns rows deleted.
    pub fn prune_activity_logs(&self, days: u32, now_ms: u64) -> Result<usize, StoreError> {
        let cutoff = cutoff_ms(now_ms, days);
        let conn = self.conn.lock();
        let deleted = busy_retry(
            "prune_activity_logs",
            || format!("days={days}"),
            || conn.execute("DELETE FROM activity_logs WHERE timestamp < ?1", [cutoff]),
        )?;
        Ok(deleted)
    }

    /// Delete transcripts older than `days`. Returns rows deleted.
    pub fn prune_conversation_logs(&self, days: u32, now_ms: u64) -> Result<usize, StoreError> {
        let cutoff = cutoff_ms(now_ms, days);
        let conn = self.conn.lock();
        let deleted = busy_retry(
            "prune_conversation_logs",
            || format!("days={days}"),
            || {
                conn.execute(
                    "DELETE FROM conversation_log WHERE created_at < ?1",
                    [cutoff],
                )
            },
        )?;
        Ok(deleted)
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.conn.lock())
    }
}

const RUN_COLUMNS: &str = "SELECT id, ticket_id, ticket_title, status, started_at, finished_at,
    cost_usd, duration_ms, num_turns, error, linear_issue_id, session_id, reviewed_at,
    exit_reason, run_type
    FROM agent_runs";

fn row_to_record(row: &Row<'_>) -> Result<RunRecord, rusqlite::Error> {
    Ok(RunRecord {
        id: ap_core::RunId::new(row.get::<_, String>(0)?),
        ticket_id: row.get(1)?,
        ticket_title: row.get(2)?,
        status: AgentStatus::parse(&row.get::<_, String>(3)?).unwrap_or(AgentStatus::Failed),
        started_at_ms: row.get(4)?,
        finished_at_ms: row.get(5)?,
        cost_usd: row.get(6)?,
        duration_ms: row.get(7)?,
        num_turns: row.get(8)?,
        error: row.get(9)?,
        tracker_issue_id: row.get(10)?,
        session_id: row.get(11)?,
        reviewed_at_ms: row.get(12)?,
        exit_reason: row
            .get::<_, Option<String>>(13)?
            .as_deref()
            .and_then(ExitReason::parse),
        run_type: row
            .get::<_, Option<String>>(14)?
            .as_deref()
            .and_then(RunType::parse)
            .unwrap_or(RunType::Executor),
    })
}

fn cutoff_ms(now_ms: u64, days: u32) -> u64 {
    now_ms.saturating_sub(u64::from(days) * 24 * 60 * 60 * 1000)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
