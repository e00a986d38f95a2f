//! Durable run log for scheduled jobs.
//!
//! Every trigger of a job writes one row with the outcome. The in-memory
//! run state answers "what is this job doing now"; this log answers "what
//! did it do last Tuesday".

use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One fired trigger and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: String,
    pub job: String,
    /// Unix seconds of the trigger.
    pub fired_at: i64,
    /// "ok" | "error" | "skipped"
    pub outcome: String,
    /// JSON summary returned by the job body, if it completed.
    pub summary: Option<String>,
    pub error: Option<String>,
}

impl RunRecord {
    fn new(job: &str, outcome: &str, summary: Option<String>, error: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job: job.to_string(),
            fired_at: Utc::now().timestamp(),
            outcome: outcome.to_string(),
            summary,
            error,
        }
    }

    pub fn ok(job: &str, summary: &serde_json::Value) -> Self {
        Self::new(job, "ok", Some(summary.to_string()), None)
    }

    pub fn error(job: &str, message: &str) -> Self {
        Self::new(job, "error", None, Some(message.to_string()))
    }

    /// A trigger that was dropped because the previous run was still going.
    pub fn skipped(job: &str) -> Self {
        Self::new(job, "skipped", None, None)
    }
}

pub struct RunLog {
    conn: Mutex<Connection>,
}

impl RunLog {
    /// Open or create the run log at the given path.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open run log")?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory run log (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory run log")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_runs (
                id       TEXT PRIMARY KEY,
                job      TEXT NOT NULL,
                fired_at INTEGER NOT NULL,
                outcome  TEXT NOT NULL,
                summary  TEXT,
                error    TEXT
            );
            CREATE INDEX IF NOT EXISTS job_runs_job ON job_runs(job);
            "#,
        )?;
        Ok(())
    }

    pub fn record(&self, entry: &RunRecord) -> Result<()> {
        let conn = self.conn.lock().expect("run log lock poisoned");
        conn.execute(
            "INSERT INTO job_runs (id, job, fired_at, outcome, summary, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.job,
                entry.fired_at,
                entry.outcome,
                entry.summary,
                entry.error,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs for one job, newest first.
    pub fn recent(&self, job: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock().expect("run log lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, job, fired_at, outcome, summary, error
             FROM job_runs WHERE job = ?1
             ORDER BY fired_at DESC, rowid DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![job, limit as i64], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    job: row.get(1)?,
                    fired_at: row.get(2)?,
                    outcome: row.get(3)?,
                    summary: row.get(4)?,
                    error: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Delete rows older than `max_age_secs`. Returns the count removed.
    pub fn prune(&self, max_age_secs: i64) -> Result<usize> {
        let cutoff = Utc::now().timestamp() - max_age_secs;
        let conn = self.conn.lock().expect("run log lock poisoned");
        let n = conn.execute("DELETE FROM job_runs WHERE fired_at < ?1", params![cutoff])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_and_recent_newest_first() {
        let log = RunLog::in_memory().unwrap();
        let first = RunRecord::ok("opportunity-scan", &json!({"found": 2}));
        let second = RunRecord::error("opportunity-scan", "engine scan exploded");
        log.record(&first).unwrap();
        log.record(&second).unwrap();
        log.record(&RunRecord::ok("cleanup", &json!({"expired": 0})))
            .unwrap();

        let runs = log.recent("opportunity-scan", 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].outcome, "error");
        assert_eq!(runs[1].outcome, "ok");
        assert_eq!(runs[1].summary.as_deref(), Some(r#"{"found":2}"#));
    }

    #[test]
    fn recent_respects_limit() {
        let log = RunLog::in_memory().unwrap();
        for i in 0..5 {
            log.record(&RunRecord::ok("cleanup", &json!({ "pass": i })))
                .unwrap();
        }
        assert_eq!(log.recent("cleanup", 3).unwrap().len(), 3);
    }

    #[test]
    fn prune_removes_only_old_rows() {
        let log = RunLog::in_memory().unwrap();
        let mut old = RunRecord::skipped("payout-processing");
        old.fired_at = Utc::now().timestamp() - 90 * 24 * 3600;
        log.record(&old).unwrap();
        log.record(&RunRecord::skipped("payout-processing")).unwrap();

        let removed = log.prune(30 * 24 * 3600).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(log.recent("payout-processing", 10).unwrap().len(), 1);
    }
}
