//! Frequency value object module
//!
//! This module defines the Frequency value object: the period between
//! scheduled runs of a job, with an optional wall-clock anchor for
//! day-or-coarser periods.

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::ConfigError;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_DAY: i64 = 86_400;

/// The period between scheduled runs of a job
///
/// Parsed from a magnitude plus unit suffix (`30m`, `2h`, `3d`) and an
/// optional `HH:MM` anchor. The anchor pins runs to a wall-clock time of
/// day and is only legal when the period is a whole number of days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Frequency {
    seconds: i64,
    anchor: Option<NaiveTime>,
}

impl Frequency {
    /// Parses a frequency spec and optional anchor field
    ///
    /// # Arguments
    ///
    /// * `spec` - Magnitude plus unit suffix, e.g. `30m`, `2h`, `3d`
    /// * `anchor` - Optional 24-hour `HH:MM` time of day
    ///
    /// # Errors
    ///
    /// `ConfigError::BadFrequency` for an unknown unit, a zero, negative or
    /// non-integer magnitude, or an empty spec. `ConfigError::TimeOnSubdailyFrequency`
    /// when an anchor accompanies a period below one whole day.
    pub fn parse(spec: &str, anchor: Option<&str>) -> Result<Self, ConfigError> {
        let bad = |reason: &str| ConfigError::BadFrequency {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut chars = spec.chars();
        let unit = chars.next_back().ok_or_else(|| bad("empty frequency"))?;
        let magnitude = chars.as_str();

        let per_unit = match unit {
            'm' => SECONDS_PER_MINUTE,
            'h' => SECONDS_PER_HOUR,
            'd' => SECONDS_PER_DAY,
            _ => return Err(bad("unit must be one of m, h, d")),
        };

        if magnitude.is_empty() || !magnitude.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad("magnitude must be a positive integer"));
        }
        let magnitude: i64 = magnitude
            .parse()
            .map_err(|_| bad("magnitude out of range"))?;
        if magnitude == 0 {
            return Err(bad("magnitude must be positive"));
        }

        let seconds = magnitude
            .checked_mul(per_unit)
            .ok_or_else(|| bad("magnitude out of range"))?;

        let anchor = match anchor {
            None => None,
            Some(raw) => {
                let parsed = NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| {
                    ConfigError::BadFrequency {
                        spec: spec.to_string(),
                        reason: format!("anchor {raw:?} is not HH:MM"),
                    }
                })?;
                if seconds % SECONDS_PER_DAY != 0 {
                    return Err(ConfigError::TimeOnSubdailyFrequency {
                        anchor: raw.to_string(),
                    });
                }
                Some(parsed)
            }
        };

        Ok(Self { seconds, anchor })
    }

    /// The period length in seconds
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// The period as a chrono Duration
    pub fn period(&self) -> Duration {
        Duration::seconds(self.seconds)
    }

    /// The wall-clock anchor, when one was configured
    pub fn anchor(&self) -> Option<NaiveTime> {
        self.anchor
    }

    /// Whether the period is one day or coarser
    pub fn is_daily_or_coarser(&self) -> bool {
        self.seconds >= SECONDS_PER_DAY
    }

    #[cfg(test)]
    pub fn from_seconds(seconds: i64) -> Self {
        Self {
            seconds,
            anchor: None,
        }
    }

    #[cfg(test)]
    pub fn with_anchor(mut self, anchor: NaiveTime) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds % SECONDS_PER_DAY == 0 {
            write!(f, "{}d", self.seconds / SECONDS_PER_DAY)?;
        } else if self.seconds % SECONDS_PER_HOUR == 0 {
            write!(f, "{}h", self.seconds / SECONDS_PER_HOUR)?;
        } else {
            write!(f, "{}m", self.seconds / SECONDS_PER_MINUTE)?;
        }
        if let Some(anchor) = self.anchor {
            write!(f, " {}", anchor.format("%H:%M"))?;
        }
        Ok(())
    }
}
