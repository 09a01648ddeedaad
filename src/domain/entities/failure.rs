//! Captured failure entity module
//!
//! This module defines the structured record of a job fault: a kind label,
//! a message, and a formatted diagnostic string. Captures are built from
//! anyhow errors and from panic payloads; unwinding never crosses the
//! runner's per-job boundary.

use serde::{Deserialize, Serialize};
use std::any::Any;
use thiserror::Error;

/// Structured record of one job fault
///
/// Serialized as JSON into the `last_error` state column with keys matching
/// the run-log columns: `type`, `value`, `traceback`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapturedFailure {
    /// Short kind label, e.g. `Error`, `Panic`, or a job-supplied kind
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable failure message
    #[serde(rename = "value")]
    pub message: String,
    /// Formatted diagnostic text, including the error chain
    pub traceback: String,
}

impl CapturedFailure {
    pub fn new(kind: &str, message: &str, traceback: &str) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.to_string(),
            traceback: traceback.to_string(),
        }
    }

    /// Captures an error returned by a job's execute function
    ///
    /// When the job returned a `JobFault` the fault's own kind label is
    /// kept; any other error is labelled `Error`. The traceback text is the
    /// alternate debug rendering of the whole error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let kind = err
            .downcast_ref::<JobFault>()
            .map(|fault| fault.kind.clone())
            .unwrap_or_else(|| "Error".to_string());
        Self {
            kind,
            message: err.to_string(),
            traceback: format!("{err:?}"),
        }
    }

    /// Captures a panic payload caught at the per-job boundary
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self {
            kind: "Panic".to_string(),
            traceback: message.clone(),
            message,
        }
    }

    /// One-line `kind: message` summary for listings and health lines
    pub fn summary(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

/// A job-raised fault carrying an explicit kind label
///
/// Jobs that want a specific label in the state store and run log return
/// this through anyhow; plain errors are recorded with kind `Error`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct JobFault {
    pub kind: String,
    pub message: String,
}

impl JobFault {
    pub fn new(kind: &str, message: &str) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_plain_error_is_labelled_error() {
        let err = anyhow!("the disk is full");
        let failure = CapturedFailure::from_error(&err);
        assert_eq!(failure.kind, "Error");
        assert_eq!(failure.message, "the disk is full");
    }

    #[test]
    fn test_job_fault_keeps_its_kind() {
        let err = anyhow::Error::new(JobFault::new("Timeout", "upstream gone"));
        let failure = CapturedFailure::from_error(&err);
        assert_eq!(failure.kind, "Timeout");
        assert_eq!(failure.message, "upstream gone");
    }

    #[test]
    fn test_traceback_includes_the_chain() {
        let err = anyhow!("root cause").context("while syncing");
        let failure = CapturedFailure::from_error(&err);
        assert!(failure.traceback.contains("root cause"));
        assert_eq!(failure.message, "while syncing");
    }

    #[test]
    fn test_panic_payload_capture() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let failure = CapturedFailure::from_panic(payload.as_ref());
        assert_eq!(failure.kind, "Panic");
        assert_eq!(failure.message, "boom");
    }

    #[test]
    fn test_json_keys_match_log_columns() {
        let failure = CapturedFailure::new("Error", "boom", "trace");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["type"], "Error");
        assert_eq!(json["value"], "boom");
        assert_eq!(json["traceback"], "trace");
    }
}
