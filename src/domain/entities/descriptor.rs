//! Job descriptor entity module
//!
//! This module defines the JobDescriptor entity: the immutable, per-invocation
//! description of one configured job, combining the scheduler-level identity
//! reported by the job app with the frequency parsed from its config line.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Frequency;

/// Immutable description of one configured job
///
/// Descriptors are built once per invocation by the registry and never
/// mutated. The `identifier` is the stable scheduler-level key used by
/// dependencies and by the state store; the `class_path` is the opaque
/// handle the loader resolved the app from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDescriptor {
    /// Stable scheduler-level key, unique across the configuration
    pub identifier: String,
    /// Opaque handle used by the loader to materialize the job app
    pub class_path: String,
    /// Period between scheduled runs, with optional wall-clock anchor
    pub frequency: Frequency,
    /// Identifiers of jobs that must have succeeded before this one runs,
    /// in declaration order
    pub depends_on: Vec<String>,
    /// Whether this job is owed one call per calendar period from a fixed
    /// origin, in order, with no skips
    pub is_backfill: bool,
}
