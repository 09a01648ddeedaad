//! Nagios health report use case module
//!
//! Consults the run log for the most recent attempt of each configured job
//! and classifies the overall health: OK when nothing failed, WARNING when
//! the only failures are backfill jobs that have each failed at most once
//! (they will catch up on their own), CRITICAL otherwise.

use crate::application::services::JobRegistry;
use crate::domain::errors::StoreError;
use crate::infrastructure::store::JobStateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NagiosStatus {
    Ok,
    Warning,
    Critical,
}

impl NagiosStatus {
    pub fn label(&self) -> &'static str {
        match self {
            NagiosStatus::Ok => "OK",
            NagiosStatus::Warning => "WARNING",
            NagiosStatus::Critical => "CRITICAL",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            NagiosStatus::Ok => 0,
            NagiosStatus::Warning => 1,
            NagiosStatus::Critical => 2,
        }
    }
}

#[derive(Debug)]
pub struct NagiosReport {
    pub status: NagiosStatus,
    pub items: Vec<String>,
}

impl NagiosReport {
    pub fn build(registry: &JobRegistry, store: &JobStateStore) -> Result<Self, StoreError> {
        let mut items = Vec::new();
        let mut critical = false;

        for descriptor in registry.descriptors() {
            let identifier = descriptor.identifier.as_str();
            let Some(latest) = store.latest_log(identifier)? else {
                continue;
            };
            if latest.success {
                continue;
            }

            // the log row itself is evidence of at least one failure
            let error_count = store
                .get(identifier)?
                .map(|state| state.error_count)
                .unwrap_or(1);
            if !descriptor.is_backfill || error_count > 1 {
                critical = true;
            }

            let summary = latest
                .failure_summary()
                .unwrap_or_else(|| "unknown failure".to_string());
            items.push(format!("{identifier} ({summary})"));
        }

        let status = if items.is_empty() {
            NagiosStatus::Ok
        } else if critical {
            NagiosStatus::Critical
        } else {
            NagiosStatus::Warning
        };
        Ok(Self { status, items })
    }

    /// The single-line summary emitted on standard output
    pub fn render(&self) -> String {
        match self.status {
            NagiosStatus::Ok => "OK - All systems nominal".to_string(),
            _ => format!("{} - {}", self.status.label(), self.items.join("; ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app::{JobApp, StaticLoader};
    use crate::domain::entities::CapturedFailure;
    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    struct HealthApp {
        identifier: &'static str,
        backfill: bool,
    }

    impl JobApp for HealthApp {
        fn identifier(&self) -> &str {
            self.identifier
        }

        fn is_backfill(&self) -> bool {
            self.backfill
        }

        fn execute(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn registry_of(jobs: Vec<(&'static str, bool)>) -> JobRegistry {
        let mut loader = StaticLoader::new();
        let mut lines = Vec::new();
        for (identifier, backfill) in jobs {
            let class_path = format!("jobs.{identifier}");
            loader.register(&class_path, move || {
                Box::new(HealthApp {
                    identifier,
                    backfill,
                })
            });
            lines.push(format!("{class_path}|1d"));
        }
        JobRegistry::build(&lines, &loader).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    fn record_success(store: &mut JobStateStore, app: &str, at: DateTime<Utc>) {
        store
            .upsert_pre_run(app, at, &[], Duration::hours(12), None)
            .unwrap();
        store
            .commit_success(app, at, at + Duration::days(1), 0.1)
            .unwrap();
    }

    fn record_failure(store: &mut JobStateStore, app: &str, at: DateTime<Utc>) {
        store
            .upsert_pre_run(app, at, &[], Duration::hours(12), None)
            .unwrap();
        let failure = CapturedFailure::new("Error", "boom", "trace");
        store
            .commit_failure(app, at, at + Duration::minutes(30), &failure, 0.1)
            .unwrap();
    }

    #[test]
    fn test_all_quiet_is_ok() {
        let dir = TempDir::new().unwrap();
        let mut store = JobStateStore::open(dir.path().join("state.db")).unwrap();
        let registry = registry_of(vec![("steady", false), ("silent", false)]);
        record_success(&mut store, "steady", now());

        let report = NagiosReport::build(&registry, &store).unwrap();
        assert_eq!(report.status, NagiosStatus::Ok);
        assert_eq!(report.render(), "OK - All systems nominal");
        assert_eq!(report.status.exit_code(), 0);
    }

    #[test]
    fn test_single_backfill_failure_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let mut store = JobStateStore::open(dir.path().join("state.db")).unwrap();
        let registry = registry_of(vec![("history", true)]);
        record_failure(&mut store, "history", now());

        let report = NagiosReport::build(&registry, &store).unwrap();
        assert_eq!(report.status, NagiosStatus::Warning);
        assert_eq!(report.render(), "WARNING - history (Error: boom)");
        assert_eq!(report.status.exit_code(), 1);
    }

    #[test]
    fn test_repeated_backfill_failure_escalates() {
        let dir = TempDir::new().unwrap();
        let mut store = JobStateStore::open(dir.path().join("state.db")).unwrap();
        let registry = registry_of(vec![("history", true)]);
        record_failure(&mut store, "history", now());
        record_failure(&mut store, "history", now() + Duration::hours(1));

        let report = NagiosReport::build(&registry, &store).unwrap();
        assert_eq!(report.status, NagiosStatus::Critical);
    }

    #[test]
    fn test_any_interval_failure_is_critical() {
        let dir = TempDir::new().unwrap();
        let mut store = JobStateStore::open(dir.path().join("state.db")).unwrap();
        let registry = registry_of(vec![("steady", false), ("history", true)]);
        record_failure(&mut store, "steady", now());
        record_failure(&mut store, "history", now());

        let report = NagiosReport::build(&registry, &store).unwrap();
        assert_eq!(report.status, NagiosStatus::Critical);
        assert_eq!(
            report.render(),
            "CRITICAL - steady (Error: boom); history (Error: boom)"
        );
        assert_eq!(report.status.exit_code(), 2);
    }

    #[test]
    fn test_recovered_job_reports_ok() {
        let dir = TempDir::new().unwrap();
        let mut store = JobStateStore::open(dir.path().join("state.db")).unwrap();
        let registry = registry_of(vec![("steady", false)]);
        record_failure(&mut store, "steady", now());
        record_success(&mut store, "steady", now() + Duration::hours(1));

        let report = NagiosReport::build(&registry, &store).unwrap();
        assert_eq!(report.status, NagiosStatus::Ok);
    }
}
