pub mod check_config;
pub mod nagios_report;
pub mod run_jobs;

pub use check_config::{CheckConfig, ConfigReport};
pub use nagios_report::{NagiosReport, NagiosStatus};
pub use run_jobs::{JobOutcome, RunJobs, RunOptions, RunReport, SkipReason};
