//! Execution runner: the state machine every run passes through.
//!
//! ```text
//!                  claim kind
//!  pending ────────────────────▶ running
//!                                   │
//!      success / failed / rate_limited / skipped
//!                                   ▼
//!                              terminal
//! ```
//!
//! The runner claims the per-kind lock, inserts the `running` ledger row,
//! drives `execute` under a timeout watchdog and the force-cancel token, and
//! in all cases closes the row with the captured log in one final write. The
//! force-cancel token is NOT the shutdown signal: the scheduler only fires
//! it once the shutdown grace period has lapsed, so in-flight executions get
//! the full grace window to finish on their own.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::{self, DbPool};
use crate::domain::error::{ErrorKind, Result};
use crate::domain::jobs::{ExecutionStatus, JobConfiguration, JobExecution};
use crate::jobs::{Job, RunContext, RunGuards, RunLog, classify};

/// Outcome of asking the runner to start a job.
pub enum Launch {
    /// The ledger row is already `running`; the spawned task drives the rest.
    Started {
        execution: JobExecution,
        handle: JoinHandle<ExecutionStatus>,
    },
    /// An execution of the same kind is already running.
    Busy,
}

pub struct JobRunner {
    pool: DbPool,
    guards: Arc<RunGuards>,
    force_cancel: CancellationToken,
}

impl JobRunner {
    pub fn new(pool: DbPool, guards: Arc<RunGuards>, force_cancel: CancellationToken) -> Self {
        Self {
            pool,
            guards,
            force_cancel,
        }
    }

    pub fn guards(&self) -> Arc<RunGuards> {
        Arc::clone(&self.guards)
    }

    /// Starts an execution for the job under its configuration, or reports
    /// `Busy` without touching the ledger. Callers decide what a busy fire
    /// means: the scheduler records `skipped`, a manual trigger rejects.
    pub fn launch(&self, job: Arc<dyn Job>, config: &JobConfiguration) -> Result<Launch> {
        let Some(claim) = self.guards.try_claim(job.kind()) else {
            return Ok(Launch::Busy);
        };

        // The in-process lock is advisory; re-check the ledger so a crashed
        // predecessor's row (or another operator surface) still blocks us.
        {
            let mut conn = self.pool.get()?;
            if db::job_executions::running_exists(&mut conn, &config.id)? {
                drop(claim);
                return Ok(Launch::Busy);
            }
        }

        let execution = {
            let mut conn = self.pool.get()?;
            db::job_executions::insert_running(&mut conn, config.id)?
        };

        let tunables = config.tunables();
        let timeout = Duration::from_secs(tunables.job_timeout_seconds.max(1));
        let ctx = Arc::new(RunContext {
            pool: self.pool.clone(),
            tunables,
            log: RunLog::new(),
            cancel: self.force_cancel.child_token(),
        });

        let pool = self.pool.clone();
        let execution_id = execution.id;
        let job_name = job.name().to_string();
        let force_cancel = self.force_cancel.clone();

        let handle = tokio::spawn(async move {
            // The claim lives exactly as long as this task.
            let _claim = claim;
            let log = ctx.log.clone();
            log.info(format!("{job_name} started"));

            let result = tokio::select! {
                result = job.execute(Arc::clone(&ctx)) => result,
                _ = sleep(timeout) => {
                    // Dropping the execute future cancels it cooperatively
                    // at its next suspension point; open per-entity
                    // transactions roll back with their connections.
                    ctx.cancel.cancel();
                    log.error(format!(
                        "{job_name} exceeded its {}s timeout",
                        timeout.as_secs()
                    ));
                    Err((ErrorKind::Timeout, "execution timed out").into())
                }
                _ = force_cancel.cancelled() => {
                    // The grace period already elapsed by the time this
                    // token fires; the run forfeits its remaining work.
                    log.warn(format!("{job_name} cancelled by shutdown"));
                    Err((ErrorKind::Cancelled, "shutdown").into())
                }
            };

            let (status, error_message) = classify(&result);
            let error_message = match (&result, status) {
                // Shutdown cancellations carry their own marker.
                (Err(err), ExecutionStatus::Failed)
                    if err.kind() == ErrorKind::Cancelled && err.ledger_message() == "shutdown" =>
                {
                    Some("shutdown".to_string())
                }
                _ => error_message,
            };
            let summary = result.as_ref().ok().map(|s| s.to_json());

            match status {
                ExecutionStatus::Success => log.info(format!("{job_name} finished")),
                ExecutionStatus::RateLimited => {
                    log.warn(format!("{job_name} yielded to the rate limiter"))
                }
                _ => log.error(format!(
                    "{job_name} failed: {}",
                    error_message.as_deref().unwrap_or("unknown")
                )),
            }

            if let Err(err) = Self::finish(
                &pool,
                &execution_id,
                status,
                summary,
                log.render(),
                error_message,
            ) {
                error!("Failed to close execution {execution_id}: {err}");
            }
            status
        });

        debug!("Execution {} launched", execution.id);
        Ok(Launch::Started { execution, handle })
    }

    fn finish(
        pool: &DbPool,
        execution_id: &uuid::Uuid,
        status: ExecutionStatus,
        summary: Option<serde_json::Value>,
        log: String,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut conn = pool.get()?;
        db::job_executions::finish(
            &mut conn,
            execution_id,
            status,
            summary,
            Some(log),
            error_message,
        )?;
        Ok(())
    }

    /// Closes any ledger rows left `running` by a previous process so the
    /// ledger never lies about live work. Run once before the scheduler
    /// starts.
    pub fn close_stale_executions(&self) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let closed = db::job_executions::close_orphaned(&mut conn, "shutdown")?;
        if closed > 0 {
            warn!("Closed {closed} stale running executions from a previous process");
        } else {
            info!("Execution ledger is clean");
        }
        Ok(closed)
    }
}
