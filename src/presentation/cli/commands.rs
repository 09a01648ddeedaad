//! CLI commands module
//!
//! Maps each admin flag to its use case and to the exit-code contract:
//! 0 success, 1 warning or job failure, 2 row claim lost, 3 gate held,
//! and for `--configtest` the count of misconfigured jobs.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::application::services::{DueTimeEngine, JobRegistry};
use crate::application::use_cases::{CheckConfig, NagiosReport, RunJobs, RunOptions};
use crate::apps::builtin_loader;
use crate::domain::app::JobLoader;
use crate::domain::entities::JobState;
use crate::domain::errors::ConfigError;
use crate::infrastructure::config::AdminConfig;
use crate::infrastructure::store::JobStateStore;
use crate::presentation::cli::Cli;

/// Routes one CLI invocation to its command and returns the exit code
pub fn dispatch(cli: &Cli) -> u8 {
    if cli.configtest {
        // --configtest never opens the store; a missing config file just
        // means validating the (empty) defaults
        let config = match AdminConfig::load(&cli.admin_conf) {
            Ok(config) => config,
            Err(ConfigError::UnreadableFile { .. }) => AdminConfig::default(),
            Err(err) => {
                eprintln!("{err}");
                return 1;
            }
        };
        let loader = builtin_loader(&config);
        return ConfigTestCommand::execute(&config, &loader);
    }

    // every other operation needs the store, so the file must be readable
    let config = match AdminConfig::load(&cli.admin_conf) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    let loader = builtin_loader(&config);

    if cli.list {
        return ListCommand::execute(&config, &loader);
    }
    if let Some(identifier) = &cli.reset_job {
        return ResetJobCommand::execute(&config, identifier);
    }
    if cli.nagios {
        return NagiosCommand::execute(&config, &loader);
    }

    let options = RunOptions {
        only_job: cli.job.clone(),
        force: cli.force,
    };
    RunCommand::execute(&config, &loader, &options)
}

/// The default command: one runner invocation
pub struct RunCommand;

impl RunCommand {
    pub fn execute(config: &AdminConfig, loader: &dyn JobLoader, options: &RunOptions) -> u8 {
        let mut registry = match JobRegistry::build(&config.jobs, loader) {
            Ok(registry) => registry,
            Err(err) => {
                eprintln!("configuration error: {err}");
                return 1;
            }
        };
        let mut store = match JobStateStore::open(&config.database) {
            Ok(store) => store,
            Err(err) => {
                eprintln!("{err}");
                return 1;
            }
        };

        let engine = DueTimeEngine::new(config.base_backoff_seconds);
        let mut runner = RunJobs::new(
            &mut registry,
            &mut store,
            engine,
            config.max_ongoing_age(),
        );
        match runner.execute(Utc::now(), options) {
            Ok(report) => {
                for (identifier, outcome) in &report.outcomes {
                    if let crate::application::use_cases::JobOutcome::Failed { failure, .. } =
                        outcome
                    {
                        eprintln!("{identifier}: {}", failure.summary());
                    }
                }
                report.exit_code()
            }
            Err(err) => {
                eprintln!("{err}");
                err.exit_code()
            }
        }
    }
}

/// `--list`: configured jobs with their persisted state
pub struct ListCommand;

impl ListCommand {
    pub fn execute(config: &AdminConfig, loader: &dyn JobLoader) -> u8 {
        let check = CheckConfig::execute(&config.jobs, loader);
        for problem in &check.problems {
            eprintln!("{}: {}", problem.subject, problem.error);
        }

        let registry = match JobRegistry::build(&config.jobs, loader) {
            Ok(registry) => registry,
            Err(_) => return 1,
        };
        let store = match JobStateStore::open(&config.database) {
            Ok(store) => store,
            Err(err) => {
                eprintln!("{err}");
                return 1;
            }
        };

        for descriptor in registry.descriptors() {
            println!(
                "{}  {}  every {}{}",
                descriptor.identifier,
                descriptor.class_path,
                descriptor.frequency,
                if descriptor.is_backfill { "  (backfill)" } else { "" },
            );
            if !descriptor.depends_on.is_empty() {
                println!("    depends on:   {}", descriptor.depends_on.join(", "));
            }
            match store.get(&descriptor.identifier) {
                Ok(Some(state)) => Self::print_state(&state, config, Utc::now()),
                Ok(None) => println!("    never run"),
                Err(err) => eprintln!("    state unreadable: {err}"),
            }
        }

        if check.is_clean() {
            0
        } else {
            1
        }
    }

    fn print_state(state: &JobState, config: &AdminConfig, now: DateTime<Utc>) {
        println!("    next run:     {}", fmt_opt(state.next_run));
        println!("    last success: {}", fmt_opt(state.last_success));
        if let Some(failure) = &state.last_error {
            println!(
                "    failures:     {} ({})",
                state.error_count,
                failure.summary()
            );
        }
        if let Some(claimed_at) = state.ongoing {
            let stale = if state.ongoing_is_stale(now, config.max_ongoing_age()) {
                " (stale)"
            } else {
                ""
            };
            println!("    ongoing:      claimed at {claimed_at}{stale}");
        }
    }
}

fn fmt_opt(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.to_rfc3339(),
        None => "-".to_string(),
    }
}

/// `--reset-job=ID`: delete the state row, keep the run log
pub struct ResetJobCommand;

impl ResetJobCommand {
    pub fn execute(config: &AdminConfig, identifier: &str) -> u8 {
        let mut store = match JobStateStore::open(&config.database) {
            Ok(store) => store,
            Err(err) => {
                eprintln!("{err}");
                return 1;
            }
        };
        match store.reset(identifier) {
            Ok(true) => {
                info!("reset state for {identifier}");
                println!("{identifier}: state deleted");
                0
            }
            Ok(false) => {
                println!("{identifier}: no state to delete");
                0
            }
            Err(err) => {
                eprintln!("{err}");
                1
            }
        }
    }
}

/// `--configtest`: exit with the number of misconfigured jobs
pub struct ConfigTestCommand;

impl ConfigTestCommand {
    pub fn execute(config: &AdminConfig, loader: &dyn JobLoader) -> u8 {
        let report = CheckConfig::execute(&config.jobs, loader);
        for problem in &report.problems {
            eprintln!("{}: {}", problem.subject, problem.error);
        }
        if report.is_clean() {
            println!("configuration ok ({} jobs)", config.jobs.len());
        } else {
            println!("{} misconfigured job(s)", report.misconfigured_count());
        }
        report.exit_code()
    }
}

/// `--nagios`: single-line health summary
pub struct NagiosCommand;

impl NagiosCommand {
    pub fn execute(config: &AdminConfig, loader: &dyn JobLoader) -> u8 {
        let registry = match JobRegistry::build(&config.jobs, loader) {
            Ok(registry) => registry,
            Err(err) => {
                println!("CRITICAL - {err}");
                return 2;
            }
        };
        let store = match JobStateStore::open(&config.database) {
            Ok(store) => store,
            Err(err) => {
                println!("CRITICAL - {err}");
                return 2;
            }
        };
        match NagiosReport::build(&registry, &store) {
            Ok(report) => {
                println!("{}", report.render());
                report.status.exit_code()
            }
            Err(err) => {
                println!("CRITICAL - {err}");
                2
            }
        }
    }
}
