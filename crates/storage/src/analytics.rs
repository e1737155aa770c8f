// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-side aggregations over finished runs.
//!
//! All grouping happens in SQL; day and week buckets are UTC, matching the
//! dashboard's expectations.

use crate::store::{Store, StoreError};
use chrono::{TimeZone, Utc};
use serde::Serialize;

/// Run totals, overall or for one UTC day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analytics {
    pub total_runs: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// Completed share of total, 0.0 when there are no runs.
    pub success_rate: f64,
    pub total_cost_usd: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCost {
    /// UTC day, `YYYY-MM-DD`.
    pub day: String,
    pub cost_usd: f64,
    pub runs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyCost {
    /// UTC ISO week, `YYYY-Www`.
    pub week: String,
    pub cost_usd: f64,
    pub runs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCost {
    pub status: String,
    pub cost_usd: f64,
    pub runs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureKindCount {
    /// Exit reason when recorded, otherwise the terminal status.
    pub kind: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyFailures {
    pub day: String,
    pub failures: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatFailure {
    pub ticket_id: String,
    pub ticket_title: String,
    pub failures: u64,
    /// Error of the most recent failed run for the ticket.
    pub last_error: Option<String>,
}

const ANALYTICS_SELECT: &str = "SELECT
    COUNT(*),
    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
    COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
    COALESCE(SUM(CASE WHEN status = 'timed_out' THEN 1 ELSE 0 END), 0),
    COALESCE(SUM(cost_usd), 0.0),
    COALESCE(AVG(duration_ms), 0.0)
    FROM agent_runs";

impl Store {
    /// Totals across every recorded run.
    pub fn analytics(&self) -> Result<Analytics, StoreError> {
        self.analytics_where(ANALYTICS_SELECT.to_string(), rusqlite::params![])
    }

    /// Totals restricted to the current UTC day.
    pub fn today_analytics(&self, now_ms: u64) -> Result<Analytics, StoreError> {
        let (start, end) = utc_day_bounds(now_ms);
        self.analytics_where(
            format!("{ANALYTICS_SELECT} WHERE finished_at >= ?1 AND finished_at < ?2"),
            rusqlite::params![start, end],
        )
    }

    fn analytics_where<P: rusqlite::Params>(
        &self,
        sql: String,
        params: P,
    ) -> Result<Analytics, StoreError> {
        let analytics = self.with_conn(|conn| {
            conn.query_row(&sql, params, |row| {
                let total_runs: u64 = row.get(0)?;
                let completed: u64 = row.get(1)?;
                Ok(Analytics {
                    total_runs,
                    completed,
                    failed: row.get(2)?,
                    timed_out: row.get(3)?,
                    success_rate: if total_runs == 0 {
                        0.0
                    } else {
                        completed as f64 / total_runs as f64
                    },
                    total_cost_usd: row.get(4)?,
                    avg_duration_ms: row.get(5)?,
                })
            })
        })?;
        Ok(analytics)
    }

    /// Cost and run count per UTC day for the trailing `days`.
    pub fn daily_cost_trend(&self, days: u32, now_ms: u64) -> Result<Vec<DailyCost>, StoreError> {
        let cutoff = trailing_cutoff(now_ms, days);
        let rows = self.with_conn(|conn| -> Result<Vec<DailyCost>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT strftime('%Y-%m-%d', finished_at / 1000, 'unixepoch') AS day,
                        COALESCE(SUM(cost_usd), 0.0), COUNT(*)
                 FROM agent_runs WHERE finished_at >= ?1
                 GROUP BY day ORDER BY day ASC",
            )?;
            let rows = stmt
                .query_map([cutoff], |row| {
                    Ok(DailyCost {
                        day: row.get(0)?,
                        cost_usd: row.get(1)?,
                        runs: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows)
    }

    /// Cost and run count per UTC week for the trailing `weeks`.
    pub fn weekly_cost_trend(
        &self,
        weeks: u32,
        now_ms: u64,
    ) -> Result<Vec<WeeklyCost>, StoreError> {
        let cutoff = trailing_cutoff(now_ms, weeks * 7);
        let rows = self.with_conn(|conn| -> Result<Vec<WeeklyCost>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT strftime('%Y-W%W', finished_at / 1000, 'unixepoch') AS week,
                        COALESCE(SUM(cost_usd), 0.0), COUNT(*)
                 FROM agent_runs WHERE finished_at >= ?1
                 GROUP BY week ORDER BY week ASC",
            )?;
            let rows = stmt
                .query_map([cutoff], |row| {
                    Ok(WeeklyCost {
                        week: row.get(0)?,
                        cost_usd: row.get(1)?,
                        runs: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows)
    }

    /// Cost grouped by terminal status for the trailing `days`.
    pub fn cost_by_status(&self, days: u32, now_ms: u64) -> Result<Vec<StatusCost>, StoreError> {
        let cutoff = trailing_cutoff(now_ms, days);
        let rows = self.with_conn(|conn| -> Result<Vec<StatusCost>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT status, COALESCE(SUM(cost_usd), 0.0), COUNT(*)
                 FROM agent_runs WHERE finished_at >= ?1
                 GROUP BY status ORDER BY status ASC",
            )?;
            let rows = stmt
                .query_map([cutoff], |row| {
                    Ok(StatusCost {
                        status: row.get(0)?,
                        cost_usd: row.get(1)?,
                        runs: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows)
    }

    /// Failure counts grouped by exit reason (falling back to status).
    pub fn failures_by_type(
        &self,
        days: u32,
        now_ms: u64,
    ) -> Result<Vec<FailureKindCount>, StoreError> {
        let cutoff = trailing_cutoff(now_ms, days);
        let rows = self.with_conn(|conn| -> Result<Vec<FailureKindCount>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT COALESCE(exit_reason, status) AS kind, COUNT(*)
                 FROM agent_runs
                 WHERE finished_at >= ?1 AND status IN ('failed', 'timed_out')
                 GROUP BY kind ORDER BY COUNT(*) DESC",
            )?;
            let rows = stmt
                .query_map([cutoff], |row| {
                    Ok(FailureKindCount {
                        kind: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows)
    }

    /// Failures per UTC day for the trailing `days`.
    pub fn failure_trend(&self, days: u32, now_ms: u64) -> Result<Vec<DailyFailures>, StoreError> {
        let cutoff = trailing_cutoff(now_ms, days);
        let rows = self.with_conn(|conn| -> Result<Vec<DailyFailures>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT strftime('%Y-%m-%d', finished_at / 1000, 'unixepoch') AS day, COUNT(*)
                 FROM agent_runs
                 WHERE finished_at >= ?1 AND status IN ('failed', 'timed_out')
                 GROUP BY day ORDER BY day ASC",
            )?;
            let rows = stmt
                .query_map([cutoff], |row| {
                    Ok(DailyFailures {
                        day: row.get(0)?,
                        failures: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows)
    }

    /// Tickets that failed at least `min_failures` times in the window,
    /// joined with the most recent error for each.
    pub fn repeat_failures(
        &self,
        min_failures: u64,
        days: u32,
        now_ms: u64,
    ) -> Result<Vec<RepeatFailure>, StoreError> {
        let cutoff = trailing_cutoff(now_ms, days);
        let rows = self.with_conn(|conn| -> Result<Vec<RepeatFailure>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT ar.ticket_id, MAX(ar.ticket_title), COUNT(*) AS failures,
                        (SELECT error FROM agent_runs inner_run
                         WHERE inner_run.ticket_id = ar.ticket_id
                           AND inner_run.status IN ('failed', 'timed_out')
                         ORDER BY inner_run.finished_at DESC LIMIT 1)
                 FROM agent_runs ar
                 WHERE ar.finished_at >= ?1 AND ar.status IN ('failed', 'timed_out')
                 GROUP BY ar.ticket_id
                 HAVING COUNT(*) >= ?2
                 ORDER BY failures DESC, ar.ticket_id ASC",
            )?;
            let rows = stmt
                .query_map([cutoff, min_failures], |row| {
                    Ok(RepeatFailure {
                        ticket_id: row.get(0)?,
                        ticket_title: row.get(1)?,
                        failures: row.get(2)?,
                        last_error: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows)
    }
}

/// Start and end (exclusive) of the UTC day containing `now_ms`.
fn utc_day_bounds(now_ms: u64) -> (u64, u64) {
    let now = Utc
        .timestamp_millis_opt(now_ms as i64)
        .single()
        .unwrap_or_default();
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt).timestamp_millis() as u64)
        .unwrap_or(now_ms);
    (day_start, day_start + 24 * 60 * 60 * 1000)
}

fn trailing_cutoff(now_ms: u64, days: u32) -> u64 {
    now_ms.saturating_sub(u64::from(days) * 24 * 60 * 60 * 1000)
}

#[cfg(test)]
#[path = "analytics_tests.rs"]
mod tests;
