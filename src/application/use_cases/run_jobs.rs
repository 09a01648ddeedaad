//! Runner use case module
//!
//! One invocation: claim the process-level gate, walk the jobs in
//! deterministic topological order, skip whatever is not due or blocked,
//! claim each due job's row, execute it (once per owed date for backfill
//! jobs), commit the outcome, and release the gate. A job failure is
//! recorded and the walk continues to independent subtrees; only lock
//! contention and store faults abort the invocation.

use chrono::{DateTime, Utc};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::application::services::backfill;
use crate::application::services::{DependencyGraph, DueTimeEngine, JobRegistry};
use crate::domain::entities::{CapturedFailure, JobDescriptor, JobState};
use crate::domain::errors::{ConfigError, RunnerError, StoreError};
use crate::infrastructure::store::JobStateStore;

/// Flags restricting or forcing one invocation's walk
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict the walk to this job
    pub only_job: Option<String>,
    /// Bypass due-time and dependency checks; never applies to backfill
    /// jobs and never bypasses an ongoing claim
    pub force: bool,
}

/// Why a job was not attempted in this invocation
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Another job was selected with `--job`
    NotSelected,
    /// The job's due instant is still in the future
    NotDue,
    /// A dependency's most recent attempt failed
    BlockedByFailure { dependency: String },
    /// A dependency has not yet succeeded in its current period
    DependencyNotReady { dependency: String },
}

/// How one job ended in this invocation
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// `runs` executions committed (one per owed date for backfill jobs)
    Succeeded { runs: usize },
    /// Failed after `completed` committed executions; for a backfill job
    /// the failing date is retried on the next invocation
    Failed {
        completed: usize,
        failure: CapturedFailure,
    },
    Skipped(SkipReason),
}

/// Per-job outcomes of one invocation, in walk order
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<(String, JobOutcome)>,
}

impl RunReport {
    pub fn outcome(&self, identifier: &str) -> Option<&JobOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, outcome)| outcome)
    }

    pub fn attempted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !matches!(outcome, JobOutcome::Skipped(_)))
            .count()
    }

    pub fn any_failed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, JobOutcome::Failed { .. }))
    }

    /// Zero when every attempted job succeeded, one otherwise
    pub fn exit_code(&self) -> u8 {
        if self.any_failed() {
            1
        } else {
            0
        }
    }
}

/// Executes one runner invocation
pub struct RunJobs<'a> {
    registry: &'a mut JobRegistry,
    store: &'a mut JobStateStore,
    engine: DueTimeEngine,
    max_ongoing_age: chrono::Duration,
}

impl<'a> RunJobs<'a> {
    pub fn new(
        registry: &'a mut JobRegistry,
        store: &'a mut JobStateStore,
        engine: DueTimeEngine,
        max_ongoing_age: chrono::Duration,
    ) -> Self {
        Self {
            registry,
            store,
            engine,
            max_ongoing_age,
        }
    }

    pub fn execute(
        &mut self,
        now: DateTime<Utc>,
        options: &RunOptions,
    ) -> Result<RunReport, RunnerError> {
        let graph = DependencyGraph::build(self.registry)?;
        let order = graph.execution_order(self.registry);

        if let Some(target) = &options.only_job {
            let descriptor = self
                .registry
                .descriptor(target)
                .ok_or_else(|| ConfigError::UnknownJob(target.clone()))?;
            if descriptor.is_backfill {
                return Err(ConfigError::BackfillNotSelectable(target.clone()).into());
            }
        }

        self.store.acquire_gate(now, self.max_ongoing_age)?;
        let walked = self.walk(now, &order, options);
        let released = self.store.release_gate();
        let report = walked?;
        released?;

        info!(
            "invocation done: {} attempted, {} of {} jobs skipped",
            report.attempted(),
            report.outcomes.len() - report.attempted(),
            report.outcomes.len(),
        );
        Ok(report)
    }

    fn walk(
        &mut self,
        now: DateTime<Utc>,
        order: &[String],
        options: &RunOptions,
    ) -> Result<RunReport, RunnerError> {
        let mut outcomes = Vec::with_capacity(order.len());
        for identifier in order {
            let outcome = self.step(now, identifier, options)?;
            outcomes.push((identifier.clone(), outcome));
        }
        Ok(RunReport { outcomes })
    }

    fn step(
        &mut self,
        now: DateTime<Utc>,
        identifier: &str,
        options: &RunOptions,
    ) -> Result<JobOutcome, RunnerError> {
        if let Some(target) = &options.only_job {
            if target != identifier {
                return Ok(JobOutcome::Skipped(SkipReason::NotSelected));
            }
        }

        let descriptor = self
            .registry
            .descriptor(identifier)
            .expect("execution order contains only configured jobs")
            .clone();
        let state = self.store.get(identifier)?;
        let forced = options.force && !descriptor.is_backfill;

        if !forced {
            for dependency in &descriptor.depends_on {
                let dep_state = self.store.get(dependency)?;
                if dep_state.and_then(|s| s.last_error).is_some() {
                    info!("skipping {identifier}: dependency {dependency} failed");
                    return Ok(JobOutcome::Skipped(SkipReason::BlockedByFailure {
                        dependency: dependency.clone(),
                    }));
                }
            }

            let due = if descriptor.is_backfill {
                !backfill::owed_dates(&descriptor.frequency, state.as_ref(), now).is_empty()
            } else {
                self.engine.is_due(&descriptor, state.as_ref(), now)
            };
            if !due {
                debug!("skipping {identifier}: not due yet");
                return Ok(JobOutcome::Skipped(SkipReason::NotDue));
            }

            for dependency in &descriptor.depends_on {
                let dep_descriptor = self
                    .registry
                    .descriptor(dependency)
                    .expect("dependencies resolve within the registry")
                    .clone();
                let dep_state = self.store.get(dependency)?;
                if !self
                    .engine
                    .dependency_succeeded_recently(&dep_descriptor, dep_state.as_ref())
                {
                    info!("skipping {identifier}: dependency {dependency} has not succeeded yet");
                    return Ok(JobOutcome::Skipped(SkipReason::DependencyNotReady {
                        dependency: dependency.clone(),
                    }));
                }
            }
        }

        // first attempt of a backfill job pins first_run to its calendar origin
        let first_run = if descriptor.is_backfill
            && state.as_ref().and_then(|s| s.first_run).is_none()
        {
            Some(backfill::aligned_origin(&descriptor.frequency, now))
        } else {
            None
        };

        self.store.upsert_pre_run(
            identifier,
            now,
            &descriptor.depends_on,
            self.max_ongoing_age,
            first_run,
        )?;

        let outcome = if descriptor.is_backfill {
            self.run_backfill(identifier, &descriptor, state.as_ref(), now)?
        } else {
            self.run_single(identifier, &descriptor, state.as_ref(), now)?
        };
        Ok(outcome)
    }

    fn run_single(
        &mut self,
        identifier: &str,
        descriptor: &JobDescriptor,
        state: Option<&JobState>,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, StoreError> {
        info!("running {identifier}");
        let timer = Instant::now();
        let app = self
            .registry
            .app_mut(identifier)
            .expect("execution order contains only configured jobs");
        let result = catch_unwind(AssertUnwindSafe(|| app.execute()));
        let duration = timer.elapsed().as_secs_f64();

        match capture(result) {
            None => {
                let next_due = self.engine.next_due_after_success(descriptor, now);
                self.store
                    .commit_success(identifier, now, next_due, duration)?;
                info!("{identifier} succeeded, next due {next_due}");
                Ok(JobOutcome::Succeeded { runs: 1 })
            }
            Some(failure) => {
                let failures = state.map(|s| s.error_count).unwrap_or(0) + 1;
                let next_due = now + self.engine.backoff_after(&descriptor.frequency, failures);
                self.store
                    .commit_failure(identifier, now, next_due, &failure, duration)?;
                warn!("{identifier} failed ({}), retry at {next_due}", failure.summary());
                Ok(JobOutcome::Failed {
                    completed: 0,
                    failure,
                })
            }
        }
    }

    fn run_backfill(
        &mut self,
        identifier: &str,
        descriptor: &JobDescriptor,
        state: Option<&JobState>,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, StoreError> {
        let owed = backfill::owed_dates(&descriptor.frequency, state, now);
        let mut completed = 0;

        for boundary in owed {
            let date = boundary.date_naive();
            info!("running {identifier} for {date}");
            let timer = Instant::now();
            let app = self
                .registry
                .app_mut(identifier)
                .expect("execution order contains only configured jobs");
            let result = catch_unwind(AssertUnwindSafe(|| app.execute_for_date(date)));
            let duration = timer.elapsed().as_secs_f64();

            match capture(result) {
                None => {
                    let next_due = boundary + descriptor.frequency.period();
                    self.store
                        .commit_success(identifier, now, next_due, duration)?;
                    completed += 1;
                }
                Some(failure) => {
                    // halt; the same date is owed again on the next invocation
                    self.store
                        .commit_failure(identifier, now, boundary, &failure, duration)?;
                    warn!(
                        "{identifier} failed for {date} ({}), sequence halted",
                        failure.summary()
                    );
                    return Ok(JobOutcome::Failed { completed, failure });
                }
            }
        }

        Ok(JobOutcome::Succeeded { runs: completed })
    }
}

fn capture(result: std::thread::Result<anyhow::Result<()>>) -> Option<CapturedFailure> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(CapturedFailure::from_error(&err)),
        Err(payload) => Some(CapturedFailure::from_panic(payload.as_ref())),
    }
}
