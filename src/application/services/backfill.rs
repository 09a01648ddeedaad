//! Backfill engine service module
//!
//! A backfill job is owed one call per whole-period boundary from its
//! first-run origin up to now, in strictly increasing order, with no
//! duplicates. This module computes the origin for a first-ever attempt
//! and the ordered list of boundaries still owed; the runner commits state
//! between boundaries so that a failure halts the sequence and the same
//! boundary is retried on the next invocation.

use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::domain::entities::JobState;
use crate::domain::value_objects::Frequency;

/// The frequency-aligned calendar origin for a first-ever attempt
///
/// Midnight of the current date in the store's session time zone, moved to
/// the anchor time of day when one is set, stepped back one day if that
/// lands in the future.
pub fn aligned_origin(frequency: &Frequency, now: DateTime<Utc>) -> DateTime<Utc> {
    let time = frequency.anchor().unwrap_or(NaiveTime::MIN);
    let mut origin = now.date_naive().and_time(time).and_utc();
    if origin > now {
        origin = origin - Duration::days(1);
    }
    origin
}

/// The ordered list of period boundaries still owed
///
/// Starts at the persisted `next_run` (falling back to `first_run`, then to
/// a fresh aligned origin) and steps by one frequency up to and including
/// the largest boundary not after `now`.
pub fn owed_dates(
    frequency: &Frequency,
    state: Option<&JobState>,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let start = state
        .and_then(|s| s.next_run)
        .or_else(|| state.and_then(|s| s.first_run))
        .unwrap_or_else(|| aligned_origin(frequency, now));

    let mut owed = Vec::new();
    let mut boundary = start;
    while boundary <= now {
        owed.push(boundary);
        boundary = boundary + frequency.period();
    }
    owed
}
