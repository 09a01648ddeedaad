//! Run log entity module
//!
//! One row per attempt, append-only. Rows are never modified after
//! insertion; the log is the authoritative record of what ran and how it
//! ended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One attempt of one job, as recorded in the run log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunLogEntry {
    pub id: i64,
    pub app_name: String,
    pub log_time: DateTime<Utc>,
    /// Wall-clock duration of the attempt, in seconds
    pub duration: f64,
    pub success: bool,
    pub exc_type: Option<String>,
    pub exc_value: Option<String>,
    pub exc_traceback: Option<String>,
}

impl RunLogEntry {
    /// One-line `kind: message` summary of the recorded failure, if any
    pub fn failure_summary(&self) -> Option<String> {
        if self.success {
            return None;
        }
        let kind = self.exc_type.as_deref().unwrap_or("Error");
        let value = self.exc_value.as_deref().unwrap_or("unknown failure");
        Some(format!("{kind}: {value}"))
    }
}
