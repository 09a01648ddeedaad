//! Error taxonomy module
//!
//! Defines the three error families of the scheduler: configuration errors
//! (fatal at startup, nothing persisted), state-store errors (including the
//! two lock-contention outcomes), and the runner-level wrapper over both.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building the job registry and dependency graph
///
/// Every variant is fatal at startup: no state is read or written once a
/// ConfigError has been raised.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The frequency field of a job line could not be parsed
    #[error("bad frequency {spec:?}: {reason}")]
    BadFrequency { spec: String, reason: String },

    /// An HH:MM anchor was given for a frequency below one whole day
    #[error("anchor time {anchor:?} requires a whole-day frequency")]
    TimeOnSubdailyFrequency { anchor: String },

    /// A job line did not have the shape `class_path|frequency[|HH:MM]`
    #[error("malformed job line {line:?}")]
    BadJobLine { line: String },

    /// Two configured jobs reported the same identifier
    #[error("duplicate job identifier {0:?}")]
    DuplicateIdentifier(String),

    /// A job declared a dependency on an identifier that is not configured
    #[error("job {app:?} depends on unknown job {dependency:?}")]
    UnknownDependency { app: String, dependency: String },

    /// The dependency graph contains a cycle through the named job
    #[error("dependency cycle involving {0:?}")]
    DependencyCycle(String),

    /// The loader has no job class registered under the given path
    #[error("no job class registered for {0:?}")]
    UnknownJobClass(String),

    /// `--job` named an identifier that is not in the configuration
    #[error("job {0:?} is not configured")]
    UnknownJob(String),

    /// `--job`/`--force` would run a backfill job out of sequence
    #[error("backfill job {0:?} cannot be selected or forced out of sequence")]
    BackfillNotSelectable(String),

    /// The admin configuration file could not be read
    #[error("cannot read config file {path:?}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration key carried an unparsable value
    #[error("bad config value for {key:?}: {value:?}")]
    BadValue { key: String, value: String },
}

/// Errors from the persistent state store
///
/// `RowLocked` and `GateHeld` are the two lock-contention outcomes of the
/// mutual-exclusion protocol; they map to exit codes 2 and 3 respectively.
/// The remaining variants are backing-store faults, fatal for the
/// invocation that hits them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another invocation holds a fresh `ongoing` claim on this job's row
    #[error("job {0:?} is already claimed by another invocation")]
    RowLocked(String),

    /// Another invocation holds a fresh claim on the runner gate
    #[error("the runner gate is held by another invocation")]
    GateHeld,

    #[error("state store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("state payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// A persisted timestamp column did not parse as RFC 3339
    #[error("unreadable timestamp {0:?} in state store")]
    Timestamp(String),
}

/// Top-level error of one runner invocation
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RunnerError {
    /// Maps the error to the process exit code contract: gate held = 3,
    /// row claim lost = 2, everything else = 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunnerError::Store(StoreError::GateHeld) => 3,
            RunnerError::Store(StoreError::RowLocked(_)) => 2,
            _ => 1,
        }
    }
}
