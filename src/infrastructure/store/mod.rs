//! Persistent state store module
//!
//! This module persists per-job scheduling state and the append-only run
//! log in SQLite, using the two-table layout shared with prior deployments
//! (`crontabber` for state, `crontabber_log` for attempts). Every operation
//! is a single transaction; the pre-run claim uses an immediate transaction
//! with a zero busy timeout so a racing invocation loses instantly instead
//! of blocking. Timestamps are stored as RFC 3339 UTC text: the session
//! time zone is fixed to UTC at connection time.

mod lock;

pub use lock::GATE_APP_NAME;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::Path;

use crate::domain::entities::{CapturedFailure, JobState, RunLogEntry};
use crate::domain::errors::StoreError;

const STATE_COLUMNS: &str =
    "app_name, next_run, first_run, last_run, last_success, error_count, depends_on, last_error, ongoing";
const LOG_COLUMNS: &str =
    "id, app_name, log_time, duration, success, exc_type, exc_value, exc_traceback";

/// SQLite-backed store for job state and the run log
pub struct JobStateStore {
    conn: Connection,
}

impl JobStateStore {
    /// Opens (creating if necessary) the state database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Zero busy timeout: a claimant that loses the race must error
        // immediately, never wait.
        conn.busy_timeout(std::time::Duration::ZERO)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS crontabber (
                app_name TEXT PRIMARY KEY,
                next_run TEXT,
                first_run TEXT,
                last_run TEXT,
                last_success TEXT,
                error_count INTEGER NOT NULL DEFAULT 0,
                depends_on TEXT,
                last_error TEXT,
                ongoing TEXT
            );

            CREATE TABLE IF NOT EXISTS crontabber_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_name TEXT NOT NULL,
                log_time TEXT NOT NULL,
                duration REAL NOT NULL,
                success INTEGER NOT NULL,
                exc_type TEXT,
                exc_value TEXT,
                exc_traceback TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_crontabber_log_app_time
                ON crontabber_log (app_name, log_time);
            "#,
        )?;
        Ok(())
    }

    /// Reads the state row for one job
    pub fn get(&self, app_name: &str) -> Result<Option<JobState>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {STATE_COLUMNS} FROM crontabber WHERE app_name = ?1"),
                params![app_name],
                RawState::from_row,
            )
            .optional()?;
        raw.map(RawState::into_state).transpose()
    }

    /// Claims the job row for an attempt starting at `started_at`
    ///
    /// Atomic compare-and-set: succeeds when the row is absent, unclaimed,
    /// or the existing claim is older than `max_ongoing_age`. On success
    /// the claim and `last_run` are set (and `first_run` on a fresh row —
    /// `first_run` overrides the attempt time for the first attempt of a
    /// backfill job, which is keyed to its calendar origin). A losing
    /// invocation gets `StoreError::RowLocked` without blocking.
    pub fn upsert_pre_run(
        &mut self,
        app_name: &str,
        started_at: DateTime<Utc>,
        depends_on: &[String],
        max_ongoing_age: Duration,
        first_run: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let depends_on = serde_json::to_string(depends_on)?;
        let result = self.with_immediate_tx(|tx| {
            let existing: Option<Option<String>> = tx
                .query_row(
                    "SELECT ongoing FROM crontabber WHERE app_name = ?1",
                    params![app_name],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(Some(raw)) = existing {
                let claimed_at = parse_ts(&raw)?;
                if started_at - claimed_at < max_ongoing_age {
                    return Err(StoreError::RowLocked(app_name.to_string()));
                }
            }
            tx.execute(
                "INSERT INTO crontabber (app_name, first_run, last_run, error_count, depends_on, ongoing)
                 VALUES (?1, ?2, ?3, 0, ?4, ?3)
                 ON CONFLICT(app_name) DO UPDATE SET
                     ongoing = excluded.ongoing,
                     last_run = excluded.last_run,
                     depends_on = excluded.depends_on",
                params![
                    app_name,
                    fmt_ts(first_run.unwrap_or(started_at)),
                    fmt_ts(started_at),
                    depends_on,
                ],
            )?;
            Ok(())
        });
        result.map_err(|err| match err {
            StoreError::Sqlite(ref cause) if is_contention(cause) => {
                StoreError::RowLocked(app_name.to_string())
            }
            other => other,
        })
    }

    /// Records a successful attempt and schedules the next one
    pub fn commit_success(
        &mut self,
        app_name: &str,
        finished_at: DateTime<Utc>,
        next_due: DateTime<Utc>,
        duration_seconds: f64,
    ) -> Result<(), StoreError> {
        self.with_immediate_tx(|tx| {
            tx.execute(
                "UPDATE crontabber
                 SET last_success = ?2, next_run = ?3,
                     error_count = 0, last_error = NULL, ongoing = NULL
                 WHERE app_name = ?1",
                params![app_name, fmt_ts(finished_at), fmt_ts(next_due)],
            )?;
            append_log(tx, app_name, finished_at, duration_seconds, true, None)
        })
    }

    /// Records a failed attempt and schedules the retry
    pub fn commit_failure(
        &mut self,
        app_name: &str,
        finished_at: DateTime<Utc>,
        next_due: DateTime<Utc>,
        failure: &CapturedFailure,
        duration_seconds: f64,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(failure)?;
        self.with_immediate_tx(|tx| {
            tx.execute(
                "UPDATE crontabber
                 SET next_run = ?2, error_count = error_count + 1,
                     last_error = ?3, ongoing = NULL
                 WHERE app_name = ?1",
                params![app_name, fmt_ts(next_due), payload],
            )?;
            append_log(
                tx,
                app_name,
                finished_at,
                duration_seconds,
                false,
                Some(failure),
            )
        })
    }

    /// Deletes the state row; run-log rows are kept
    ///
    /// Returns whether a row existed. Resetting a never-run job is a no-op.
    pub fn reset(&mut self, app_name: &str) -> Result<bool, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM crontabber WHERE app_name = ?1",
            params![app_name],
        )?;
        Ok(deleted > 0)
    }

    /// The most recent run-log entry for one job
    pub fn latest_log(&self, app_name: &str) -> Result<Option<RunLogEntry>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM crontabber_log
                     WHERE app_name = ?1 ORDER BY log_time DESC, id DESC LIMIT 1"
                ),
                params![app_name],
                RawLog::from_row,
            )
            .optional()?;
        raw.map(RawLog::into_entry).transpose()
    }

    /// Every run-log entry for one job, oldest first
    pub fn run_log(&self, app_name: &str) -> Result<Vec<RunLogEntry>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM crontabber_log WHERE app_name = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![app_name], RawLog::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// Deletes run-log rows older than `cutoff`; returns how many went
    pub fn purge_log_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM crontabber_log WHERE log_time < ?1",
            params![fmt_ts(cutoff)],
        )?;
        Ok(deleted)
    }

    fn with_immediate_tx<T, F>(&mut self, body: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T, StoreError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn append_log(
    tx: &rusqlite::Transaction,
    app_name: &str,
    log_time: DateTime<Utc>,
    duration_seconds: f64,
    success: bool,
    failure: Option<&CapturedFailure>,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO crontabber_log
             (app_name, log_time, duration, success, exc_type, exc_value, exc_traceback)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            app_name,
            fmt_ts(log_time),
            duration_seconds,
            success,
            failure.map(|f| f.kind.as_str()),
            failure.map(|f| f.message.as_str()),
            failure.map(|f| f.traceback.as_str()),
        ],
    )?;
    Ok(())
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(cause, _)
            if cause.code == ErrorCode::DatabaseBusy || cause.code == ErrorCode::DatabaseLocked
    )
}

/// Uniform-width RFC 3339 so lexicographic text order matches time order
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(raw.to_string()))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_ts).transpose()
}

struct RawState {
    app_name: String,
    next_run: Option<String>,
    first_run: Option<String>,
    last_run: Option<String>,
    last_success: Option<String>,
    error_count: u32,
    depends_on: Option<String>,
    last_error: Option<String>,
    ongoing: Option<String>,
}

impl RawState {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            app_name: row.get(0)?,
            next_run: row.get(1)?,
            first_run: row.get(2)?,
            last_run: row.get(3)?,
            last_success: row.get(4)?,
            error_count: row.get(5)?,
            depends_on: row.get(6)?,
            last_error: row.get(7)?,
            ongoing: row.get(8)?,
        })
    }

    fn into_state(self) -> Result<JobState, StoreError> {
        let depends_on = match self.depends_on.as_deref() {
            Some(raw) => serde_json::from_str(raw)?,
            None => Vec::new(),
        };
        let last_error = self
            .last_error
            .as_deref()
            .map(serde_json::from_str::<CapturedFailure>)
            .transpose()?;
        Ok(JobState {
            app_name: self.app_name,
            next_run: parse_opt_ts(self.next_run)?,
            first_run: parse_opt_ts(self.first_run)?,
            last_run: parse_opt_ts(self.last_run)?,
            last_success: parse_opt_ts(self.last_success)?,
            error_count: self.error_count,
            depends_on,
            last_error,
            ongoing: parse_opt_ts(self.ongoing)?,
        })
    }
}

struct RawLog {
    id: i64,
    app_name: String,
    log_time: String,
    duration: f64,
    success: bool,
    exc_type: Option<String>,
    exc_value: Option<String>,
    exc_traceback: Option<String>,
}

impl RawLog {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            app_name: row.get(1)?,
            log_time: row.get(2)?,
            duration: row.get(3)?,
            success: row.get(4)?,
            exc_type: row.get(5)?,
            exc_value: row.get(6)?,
            exc_traceback: row.get(7)?,
        })
    }

    fn into_entry(self) -> Result<RunLogEntry, StoreError> {
        Ok(RunLogEntry {
            id: self.id,
            app_name: self.app_name,
            log_time: parse_ts(&self.log_time)?,
            duration: self.duration,
            success: self.success,
            exc_type: self.exc_type,
            exc_value: self.exc_value,
            exc_traceback: self.exc_traceback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn open_pair() -> (TempDir, JobStateStore) {
        let dir = TempDir::new().unwrap();
        let store = JobStateStore::open(dir.path().join("state.db")).unwrap();
        (dir, store)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    fn max_age() -> Duration {
        Duration::hours(12)
    }

    #[test]
    fn test_get_on_missing_row() {
        let (_dir, store) = open_pair();
        assert_eq!(store.get("absent").unwrap(), None);
    }

    #[test]
    fn test_pre_run_creates_the_row() {
        let (_dir, mut store) = open_pair();
        let deps = vec!["ingest".to_string()];
        store
            .upsert_pre_run("reports", now(), &deps, max_age(), None)
            .unwrap();

        let state = store.get("reports").unwrap().unwrap();
        assert_eq!(state.ongoing, Some(now()));
        assert_eq!(state.last_run, Some(now()));
        assert_eq!(state.first_run, Some(now()));
        assert_eq!(state.depends_on, deps);
        assert_eq!(state.next_run, None);
        assert_eq!(state.error_count, 0);
    }

    #[test]
    fn test_pre_run_first_run_override() {
        let (_dir, mut store) = open_pair();
        let origin = now() - Duration::days(3);
        store
            .upsert_pre_run("backfill", now(), &[], max_age(), Some(origin))
            .unwrap();

        let state = store.get("backfill").unwrap().unwrap();
        assert_eq!(state.first_run, Some(origin));
        assert_eq!(state.last_run, Some(now()));
    }

    #[test]
    fn test_fresh_claim_blocks_a_second_claimant() {
        let (dir, mut store) = open_pair();
        store
            .upsert_pre_run("reports", now(), &[], max_age(), None)
            .unwrap();

        let mut rival = JobStateStore::open(dir.path().join("state.db")).unwrap();
        let err = rival
            .upsert_pre_run("reports", now() + Duration::minutes(1), &[], max_age(), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::RowLocked(app) if app == "reports"));
    }

    #[test]
    fn test_stale_claim_is_reclaimable() {
        let (_dir, mut store) = open_pair();
        let long_ago = now() - Duration::hours(13);
        store
            .upsert_pre_run("reports", long_ago, &[], max_age(), None)
            .unwrap();

        store
            .upsert_pre_run("reports", now(), &[], max_age(), None)
            .unwrap();
        let state = store.get("reports").unwrap().unwrap();
        assert_eq!(state.ongoing, Some(now()));
        // first_run survives the reclaim
        assert_eq!(state.first_run, Some(long_ago));
    }

    #[test]
    fn test_commit_success_clears_failure_state() {
        let (_dir, mut store) = open_pair();
        store
            .upsert_pre_run("reports", now(), &[], max_age(), None)
            .unwrap();
        let failure = CapturedFailure::new("Error", "boom", "trace");
        store
            .commit_failure("reports", now(), now() + Duration::minutes(30), &failure, 0.5)
            .unwrap();

        let failed = store.get("reports").unwrap().unwrap();
        assert_eq!(failed.error_count, 1);
        assert_eq!(failed.last_error, Some(failure));
        assert_eq!(failed.ongoing, None);

        let finished = now() + Duration::hours(1);
        store
            .upsert_pre_run("reports", finished, &[], max_age(), None)
            .unwrap();
        store
            .commit_success("reports", finished, finished + Duration::minutes(5), 1.0)
            .unwrap();

        let healthy = store.get("reports").unwrap().unwrap();
        assert_eq!(healthy.error_count, 0);
        assert_eq!(healthy.last_error, None);
        assert_eq!(healthy.last_success, Some(finished));
        assert_eq!(healthy.next_run, Some(finished + Duration::minutes(5)));
        assert_eq!(healthy.ongoing, None);
    }

    #[test]
    fn test_run_log_is_append_only_and_ordered() {
        let (_dir, mut store) = open_pair();
        store
            .upsert_pre_run("reports", now(), &[], max_age(), None)
            .unwrap();
        let failure = CapturedFailure::new("Error", "boom", "trace");
        store
            .commit_failure("reports", now(), now(), &failure, 0.1)
            .unwrap();
        store
            .commit_success("reports", now() + Duration::minutes(30), now() + Duration::hours(1), 0.2)
            .unwrap();

        let entries = store.run_log("reports").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].success);
        assert_eq!(entries[0].exc_type.as_deref(), Some("Error"));
        assert!(entries[1].success);
        assert_eq!(entries[1].exc_type, None);

        let latest = store.latest_log("reports").unwrap().unwrap();
        assert!(latest.success);
    }

    #[test]
    fn test_reset_is_idempotent_and_keeps_the_log() {
        let (_dir, mut store) = open_pair();
        store
            .upsert_pre_run("reports", now(), &[], max_age(), None)
            .unwrap();
        store
            .commit_success("reports", now(), now() + Duration::minutes(5), 0.1)
            .unwrap();

        assert!(store.reset("reports").unwrap());
        assert_eq!(store.get("reports").unwrap(), None);
        assert_eq!(store.run_log("reports").unwrap().len(), 1);

        // second reset, and reset of a never-run job, are no-ops
        assert!(!store.reset("reports").unwrap());
        assert!(!store.reset("never-ran").unwrap());
    }

    #[test]
    fn test_purge_log_before_cutoff() {
        let (_dir, mut store) = open_pair();
        store
            .upsert_pre_run("reports", now(), &[], max_age(), None)
            .unwrap();
        store
            .commit_success("reports", now() - Duration::days(200), now(), 0.1)
            .unwrap();
        store
            .commit_success("reports", now(), now() + Duration::minutes(5), 0.1)
            .unwrap();

        let purged = store.purge_log_before(now() - Duration::days(180)).unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.run_log("reports").unwrap().len(), 1);
    }
}
