//! Job application contract module
//!
//! This module defines the seam between the scheduling core and user job
//! code: the JobApp trait every job implements, and the JobLoader trait
//! that materializes an app from its opaque class path. The core never
//! interprets class paths itself; the shipped binary registers its apps in
//! a StaticLoader, and embedders supply their own loader.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

use crate::domain::errors::ConfigError;

/// A job application as seen by the scheduler
///
/// The scheduler reads `identifier`, `depends_on` and `is_backfill` once
/// per invocation while building the registry. A non-backfill job is run
/// through `execute`; a backfill job is run through `execute_for_date`,
/// once per owed calendar date in order. Failure is signalled by returning
/// an error (or panicking); the runner captures either into a structured
/// failure record.
pub trait JobApp {
    /// Stable scheduler-level key for this job
    fn identifier(&self) -> &str;

    /// Identifiers of jobs that must have succeeded before this one runs
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether this job is owed one call per calendar period, in order
    fn is_backfill(&self) -> bool {
        false
    }

    /// Executes one scheduled run of a non-backfill job
    fn execute(&mut self) -> Result<()> {
        bail!("job {} has no interval execution", self.identifier())
    }

    /// Executes one owed calendar date of a backfill job
    fn execute_for_date(&mut self, date: NaiveDate) -> Result<()> {
        let _ = date;
        bail!("job {} has no backfill execution", self.identifier())
    }
}

impl fmt::Debug for dyn JobApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobApp")
            .field("identifier", &self.identifier())
            .finish()
    }
}

/// Materializes a job app from its opaque class path
#[cfg_attr(test, mockall::automock)]
pub trait JobLoader {
    fn load(&self, class_path: &str) -> Result<Box<dyn JobApp>, ConfigError>;
}

type AppFactory = Box<dyn Fn() -> Box<dyn JobApp>>;

/// A loader backed by an explicit registration map
///
/// The shipped binary populates one of these at program start; tests
/// register their fixture apps the same way.
#[derive(Default)]
pub struct StaticLoader {
    factories: HashMap<String, AppFactory>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a class path
    ///
    /// The factory closure carries whatever capabilities the app needs
    /// (database paths, connection handles); the core never sees them.
    pub fn register<F>(&mut self, class_path: &str, factory: F)
    where
        F: Fn() -> Box<dyn JobApp> + 'static,
    {
        self.factories.insert(class_path.to_string(), Box::new(factory));
    }
}

impl JobLoader for StaticLoader {
    fn load(&self, class_path: &str) -> Result<Box<dyn JobApp>, ConfigError> {
        match self.factories.get(class_path) {
            Some(factory) => Ok(factory()),
            None => Err(ConfigError::UnknownJobClass(class_path.to_string())),
        }
    }
}
