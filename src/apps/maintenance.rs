//! Built-in maintenance apps module
//!
//! Jobs the shipped binary registers out of the box. They receive their
//! capabilities (here, the path of the state database) from the loader
//! closure at registration time; the scheduling core hands them nothing.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::path::PathBuf;
use tracing::info;

use crate::domain::app::JobApp;
use crate::infrastructure::store::JobStateStore;

/// Deletes run-log rows older than the retention window
///
/// The run log is append-only and grows without bound; this keeps it to a
/// fixed horizon while leaving all job state untouched.
pub struct PurgeRunLogApp {
    database: PathBuf,
    retention_days: u32,
}

impl PurgeRunLogApp {
    pub const CLASS_PATH: &'static str = "cronweaver.apps.PurgeRunLog";

    pub fn new(database: PathBuf, retention_days: u32) -> Self {
        Self {
            database,
            retention_days,
        }
    }
}

impl JobApp for PurgeRunLogApp {
    fn identifier(&self) -> &str {
        "purge-run-log"
    }

    fn execute(&mut self) -> Result<()> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let mut store =
            JobStateStore::open(&self.database).context("opening the state database")?;
        let purged = store
            .purge_log_before(cutoff)
            .context("purging old run-log rows")?;
        info!(
            "purged {purged} run-log rows older than {} days",
            self.retention_days
        );
        Ok(())
    }
}
