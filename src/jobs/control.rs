//! Operator surface over the job system: configuration listing, toggles,
//! schedule edits, manual triggers and execution observability. All calls
//! return quickly; a manual trigger hands the actual run to the runner's
//! spawned task.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::watch;
use tracing::info;

use crate::db::{self, DbPool};
use crate::domain::error::{ErrorKind, Result};
use crate::domain::jobs::{ExecutionKey, JobConfiguration, JobExecution, JobKind};
use crate::domain::rate_limit::RateLimitEvent;
use crate::jobs::Job;
use crate::jobs::runner::{JobRunner, Launch};
use crate::jobs::scheduler::ScheduleSpec;

/// Result of a manual trigger request.
#[derive(Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started(ExecutionKey),
    Rejected { reason: &'static str },
}

pub struct JobControl {
    pool: DbPool,
    runner: Arc<JobRunner>,
    jobs: HashMap<JobKind, Arc<dyn Job>>,
    reload_tx: watch::Sender<u32>,
}

impl JobControl {
    pub fn new(
        pool: DbPool,
        runner: Arc<JobRunner>,
        registry: &[Arc<dyn Job>],
        reload_tx: watch::Sender<u32>,
    ) -> Self {
        let jobs = registry
            .iter()
            .map(|job| (job.kind(), Arc::clone(job)))
            .collect();
        Self {
            pool,
            runner,
            jobs,
            reload_tx,
        }
    }

    pub fn list_configurations(&self) -> Result<Vec<JobConfiguration>> {
        let mut conn = self.pool.get()?;
        db::job_configurations::list_all(&mut conn)
    }

    /// Toggles a job and re-registers the scheduler's triggers in place.
    pub fn set_enabled(&self, kind: JobKind, enabled: bool) -> Result<()> {
        let mut conn = self.pool.get()?;
        let updated = db::job_configurations::set_enabled(&mut conn, kind, enabled)?;
        if updated == 0 {
            return Err((
                ErrorKind::ConfigInvalid,
                "no configuration row for job kind",
                kind.to_string(),
            )
                .into());
        }
        info!("Job {kind} {}", if enabled { "enabled" } else { "disabled" });
        self.notify_reload();
        Ok(())
    }

    /// Replaces a job's schedule. The expression is validated before it is
    /// stored so the scheduler never reloads into a broken trigger.
    pub fn update_schedule(&self, kind: JobKind, expression: &str) -> Result<()> {
        ScheduleSpec::parse(expression)?;
        let mut conn = self.pool.get()?;
        let updated = db::job_configurations::update_schedule(&mut conn, kind, expression)?;
        if updated == 0 {
            return Err((
                ErrorKind::ConfigInvalid,
                "no configuration row for job kind",
                kind.to_string(),
            )
                .into());
        }
        info!("Job {kind} rescheduled to {expression:?}");
        self.notify_reload();
        Ok(())
    }

    /// Requests an immediate run. Enters the same state machine as a
    /// scheduled fire; contention with a running execution rejects the
    /// request without writing a ledger row.
    pub fn trigger(&self, kind: JobKind) -> Result<TriggerOutcome> {
        let Some(job) = self.jobs.get(&kind) else {
            return Ok(TriggerOutcome::Rejected {
                reason: "unknown_job",
            });
        };
        let config = {
            let mut conn = self.pool.get()?;
            db::job_configurations::find_by_type(&mut conn, kind)?
        };
        let Some(config) = config else {
            return Ok(TriggerOutcome::Rejected {
                reason: "not_configured",
            });
        };

        match self.runner.launch(Arc::clone(job), &config)? {
            Launch::Started { execution, .. } => {
                info!("Job {kind} triggered manually, execution {}", execution.id);
                Ok(TriggerOutcome::Started(execution.id))
            }
            Launch::Busy => Ok(TriggerOutcome::Rejected {
                reason: "already_running",
            }),
        }
    }

    /// Recent executions for one job kind, newest first, paged.
    pub fn list_executions(
        &self,
        kind: JobKind,
        page_size: i64,
        offset: i64,
    ) -> Result<Vec<JobExecution>> {
        let mut conn = self.pool.get()?;
        let Some(config) = db::job_configurations::find_by_type(&mut conn, kind)? else {
            return Ok(Vec::new());
        };
        db::job_executions::list_recent(&mut conn, &config.id, page_size, offset)
    }

    /// One execution with its captured log blob.
    pub fn get_execution(&self, id: &ExecutionKey) -> Result<Option<JobExecution>> {
        let mut conn = self.pool.get()?;
        db::job_executions::get(&mut conn, id)
    }

    /// Throttling events observed inside the trailing window.
    pub fn rate_limit_events(&self, window_hours: i64) -> Result<Vec<RateLimitEvent>> {
        let mut conn = self.pool.get()?;
        db::rate_limit_log::list_window(&mut conn, Utc::now() - Duration::hours(window_hours))
    }

    fn notify_reload(&self) {
        self.reload_tx.send_modify(|generation| *generation += 1);
    }
}
