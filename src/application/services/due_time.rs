//! Due-time engine service module
//!
//! This service decides when a non-backfill job is next due, given its
//! persisted state: immediately when it has never run, after an exponential
//! backoff (capped at one frequency) while it is failing, and one frequency
//! after the last success otherwise, snapped to the configured wall-clock
//! anchor when one is set.

use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::domain::entities::{JobDescriptor, JobState};
use crate::domain::value_objects::Frequency;

/// Moves a candidate instant onto the anchor time of day
///
/// The date component of the candidate is kept and its time component is
/// replaced, so an anchored daily job stays at its wall-clock slot instead
/// of drifting by execution latency. Anchors are interpreted in the
/// store's session time zone, which the store fixes to UTC.
pub fn anchor_onto(candidate: DateTime<Utc>, anchor: NaiveTime) -> DateTime<Utc> {
    candidate.date_naive().and_time(anchor).and_utc()
}

/// Decides when each job is next due
pub struct DueTimeEngine {
    base_backoff_seconds: i64,
}

impl DueTimeEngine {
    pub const DEFAULT_BASE_BACKOFF_SECONDS: i64 = 1_800;

    pub fn new(base_backoff_seconds: i64) -> Self {
        Self {
            base_backoff_seconds,
        }
    }

    /// Retry delay after `error_count` consecutive failures
    ///
    /// `min(base_backoff * 2^(n-1), frequency)`: failures back off
    /// exponentially but a failing job is never delayed past one regular
    /// period.
    pub fn backoff_after(&self, frequency: &Frequency, error_count: u32) -> Duration {
        let exponent = error_count.saturating_sub(1).min(32);
        let seconds = self
            .base_backoff_seconds
            .saturating_mul(1_i64 << exponent)
            .min(frequency.seconds());
        Duration::seconds(seconds)
    }

    /// The instant the job becomes due, or None when it is due immediately
    pub fn due_at(&self, descriptor: &JobDescriptor, state: Option<&JobState>) -> Option<DateTime<Utc>> {
        let state = state?;

        if state.last_error.is_some() {
            let last_run = state.last_run?;
            return Some(last_run + self.backoff_after(&descriptor.frequency, state.error_count.max(1)));
        }

        let last_success = state.last_success?;
        let candidate = last_success + descriptor.frequency.period();
        Some(match descriptor.frequency.anchor() {
            Some(anchor) => anchor_onto(candidate, anchor),
            None => candidate,
        })
    }

    pub fn is_due(
        &self,
        descriptor: &JobDescriptor,
        state: Option<&JobState>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.due_at(descriptor, state) {
            Some(due_at) => due_at <= now,
            None => true,
        }
    }

    /// The due instant after a successful run finishing at `finished_at`
    pub fn next_due_after_success(
        &self,
        descriptor: &JobDescriptor,
        finished_at: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let candidate = finished_at + descriptor.frequency.period();
        match descriptor.frequency.anchor() {
            Some(anchor) => anchor_onto(candidate, anchor),
            None => candidate,
        }
    }

    /// Whether a dependency's most recent attempt succeeded
    ///
    /// The dependency must have a last success newer than the start of its
    /// current period (`next_run - frequency`); a dependency that has never
    /// run, or whose latest attempt failed, blocks its dependents.
    pub fn dependency_succeeded_recently(
        &self,
        dependency: &JobDescriptor,
        state: Option<&JobState>,
    ) -> bool {
        let Some(state) = state else {
            return false;
        };
        if state.last_error.is_some() {
            return false;
        }
        match (state.last_success, state.next_run) {
            (Some(last_success), Some(next_run)) => {
                last_success > next_run - dependency.frequency.period()
            }
            (Some(_), None) => true,
            _ => false,
        }
    }
}

impl Default for DueTimeEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_BACKOFF_SECONDS)
    }
}
