//! Process-level gate module
//!
//! The first layer of the two-level mutual-exclusion protocol: a
//! distinguished singleton row in the state table records whether any
//! invocation is currently inside the runner. The second layer is the
//! per-job `ongoing` claim taken by `upsert_pre_run`. Both layers treat a
//! claim older than `max_ongoing_age` as abandoned, so a crashed
//! invocation cannot wedge the system forever.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use super::{fmt_ts, is_contention, parse_ts, JobStateStore};
use crate::domain::errors::StoreError;

/// Reserved row key for the gate; `@` cannot appear in a job identifier
pub const GATE_APP_NAME: &str = "@runner";

impl JobStateStore {
    /// Claims the runner gate
    ///
    /// Fails with `StoreError::GateHeld` when another invocation holds a
    /// claim younger than `max_ongoing_age`, without blocking.
    pub fn acquire_gate(
        &mut self,
        now: DateTime<Utc>,
        max_ongoing_age: Duration,
    ) -> Result<(), StoreError> {
        let result = self.with_immediate_tx(|tx| {
            let existing: Option<Option<String>> = tx
                .query_row(
                    "SELECT ongoing FROM crontabber WHERE app_name = ?1",
                    params![GATE_APP_NAME],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(Some(raw)) = existing {
                let claimed_at = parse_ts(&raw)?;
                if now - claimed_at < max_ongoing_age {
                    return Err(StoreError::GateHeld);
                }
            }
            tx.execute(
                "INSERT INTO crontabber (app_name, error_count, depends_on, ongoing)
                 VALUES (?1, 0, '[]', ?2)
                 ON CONFLICT(app_name) DO UPDATE SET ongoing = excluded.ongoing",
                params![GATE_APP_NAME, fmt_ts(now)],
            )?;
            Ok(())
        });
        result.map_err(|err| match err {
            StoreError::Sqlite(ref cause) if is_contention(cause) => StoreError::GateHeld,
            other => other,
        })
    }

    /// Releases the runner gate
    pub fn release_gate(&mut self) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE crontabber SET ongoing = NULL WHERE app_name = ?1",
            params![GATE_APP_NAME],
        )?;
        Ok(())
    }
}
