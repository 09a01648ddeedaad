//! Job state entity module
//!
//! This module defines the JobState entity: the mutable, persisted scheduling
//! state of one job, keyed by its identifier. Rows are created lazily on the
//! first attempt, mutated only by the runner under the row-level claim, and
//! deleted only by the reset operation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::CapturedFailure;

/// Persisted scheduling state of one job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobState {
    /// Identifier this row is keyed by
    pub app_name: String,
    /// Earliest instant at which the job becomes due again
    pub next_run: Option<DateTime<Utc>>,
    /// Timestamp of the first attempt; the backfill calendar origin
    pub first_run: Option<DateTime<Utc>>,
    /// Timestamp of the most recent attempt
    pub last_run: Option<DateTime<Utc>>,
    /// Timestamp of the most recent successful attempt
    pub last_success: Option<DateTime<Utc>>,
    /// Consecutive-failure counter; reset to zero on success
    pub error_count: u32,
    /// Snapshot of the declared dependencies at the last attempt
    pub depends_on: Vec<String>,
    /// Structured descriptor of the most recent failure
    pub last_error: Option<CapturedFailure>,
    /// Claim marking this job as currently executing
    pub ongoing: Option<DateTime<Utc>>,
}

impl JobState {
    /// Whether the `ongoing` claim is set but older than `max_age`
    ///
    /// A stale claim belongs to a crashed or hung invocation and may be
    /// reclaimed by the next invocation.
    pub fn ongoing_is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.ongoing {
            Some(claimed_at) => now - claimed_at >= max_age,
            None => false,
        }
    }
}
