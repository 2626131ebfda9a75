//! Background job framework.
//!
//! A job is a unit with a stable kind, a human name and one `execute`
//! operation. The runner wraps every execution with the ledger state
//! machine (`running` → terminal), per-run log capture, a timeout watchdog
//! and rate-limit classification; the scheduler decides when executions
//! fire. The four concrete jobs live in their own modules and are collected
//! into an explicit registry at startup.

pub mod analyzer;
pub mod ban_checker;
pub mod control;
pub mod fetcher;
pub mod runner;
pub mod scheduler;
pub mod updater;

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::data::DataManager;
use crate::db::DbPool;
use crate::domain::error::{Error, ErrorKind, Result};
use crate::domain::jobs::{ExecutionStatus, JobKind, JobTunables, RunSummary};

/// One concrete background job.
#[async_trait]
pub trait Job: Send + Sync {
    fn kind(&self) -> JobKind;
    fn name(&self) -> &str;
    async fn execute(&self, ctx: Arc<RunContext>) -> Result<RunSummary>;
}

/// Everything the framework hands one execution. Cloned handles only; the
/// context is shared across a job's bounded fan-out.
pub struct RunContext {
    pub pool: DbPool,
    pub tunables: JobTunables,
    pub log: RunLog,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Errors with `Cancelled` once the execution's token fires. Jobs call
    /// this at the top of every per-entity step.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err((ErrorKind::Cancelled, "execution cancelled").into())
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub at: DateTime<Utc>,
    pub level: &'static str,
    pub message: String,
}

/// Per-run log capture. Buffers every record for the execution ledger and
/// mirrors it to the process-wide tracing subscriber.
#[derive(Clone, Default)]
pub struct RunLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.push("INFO", message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.push("WARN", message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.push("ERROR", message);
    }

    fn push(&self, level: &'static str, message: String) {
        self.records.lock().unwrap().push(LogRecord {
            at: Utc::now(),
            level,
            message,
        });
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Renders the buffer into the ledger blob, one record per line.
    pub fn render(&self) -> String {
        let records = self.records.lock().unwrap();
        let mut out = String::new();
        for record in records.iter() {
            let _ = writeln!(
                out,
                "{} {:5} {}",
                record.at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level,
                record.message
            );
        }
        out
    }
}

/// In-process locks enforcing at most one running execution per job kind.
/// Advisory inside the process; the ledger's partial unique index backs the
/// same invariant in the database.
#[derive(Default)]
pub struct RunGuards {
    running: Mutex<HashSet<JobKind>>,
}

impl RunGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the kind, or `None` when an execution already holds it.
    pub fn try_claim(self: &Arc<Self>, kind: JobKind) -> Option<RunClaim> {
        let mut running = self.running.lock().unwrap();
        if running.insert(kind) {
            Some(RunClaim {
                guards: Arc::clone(self),
                kind,
            })
        } else {
            None
        }
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.running.lock().unwrap().contains(&kind)
    }
}

/// Releases its job kind on drop.
pub struct RunClaim {
    guards: Arc<RunGuards>,
    kind: JobKind,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.guards.running.lock().unwrap().remove(&self.kind);
    }
}

/// Terminal classification of a finished execute call. Rate-limit surfaces
/// terminate the run as `rate_limited`, which is a normal state, not a
/// failure: jobs return their partial summary with the `rate_limited` flag
/// set, and a 429 that bubbles out as an error maps to the same status.
/// Everything else failing maps to `failed` with a short sanitized marker.
pub fn classify(result: &Result<RunSummary>) -> (ExecutionStatus, Option<String>) {
    match result {
        Ok(summary) if summary.rate_limited => (ExecutionStatus::RateLimited, None),
        Ok(_) => (ExecutionStatus::Success, None),
        Err(err) => match err.kind() {
            ErrorKind::RateLimited => (ExecutionStatus::RateLimited, Some(err.ledger_message())),
            ErrorKind::Timeout => (ExecutionStatus::Failed, Some("timeout".to_string())),
            ErrorKind::Cancelled => (ExecutionStatus::Failed, Some("cancelled".to_string())),
            ErrorKind::ConfigInvalid => (
                ExecutionStatus::Failed,
                Some(format!("config: {}", err.ledger_message())),
            ),
            _ => (ExecutionStatus::Failed, Some(err.ledger_message())),
        },
    }
}

/// Converts a degraded data-manager answer into the rate-limit yield every
/// job applies around its critical section. The error unwinds the job's
/// inner loops; at the top of `execute` the job catches it, flags its
/// partial summary as rate limited and returns the summary as a value.
pub fn yield_if_rate_limited<T>(ensured: &crate::data::Ensured<T>) -> Result<()> {
    if let crate::data::Ensured::MissingRateLimited { retry_after } = ensured {
        return Err(Error::rate_limited(*retry_after));
    }
    Ok(())
}

/// The explicit job table handed to the scheduler at startup.
pub fn registry(
    pool: DbPool,
    data: Arc<DataManager>,
    scoring: crate::configuration::ScoringSettings,
) -> Vec<Arc<dyn Job>> {
    vec![
        Arc::new(updater::TrackedPlayerUpdater::new(Arc::clone(&data))),
        Arc::new(fetcher::MatchFetcher::new(Arc::clone(&data))),
        Arc::new(analyzer::PlayerAnalyzer::new(pool.clone(), scoring)),
        Arc::new(ban_checker::BanChecker::new(data)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_guards_are_exclusive_per_kind() {
        let guards = Arc::new(RunGuards::new());
        let claim = guards.try_claim(JobKind::MatchFetcher);
        assert!(claim.is_some());
        assert!(guards.try_claim(JobKind::MatchFetcher).is_none());
        // A different kind is unaffected.
        assert!(guards.try_claim(JobKind::BanChecker).is_some());

        drop(claim);
        assert!(guards.try_claim(JobKind::MatchFetcher).is_some());
    }

    #[test]
    fn classify_maps_rate_limit_to_a_normal_state() {
        let result: Result<RunSummary> =
            Err(Error::rate_limited(Some(std::time::Duration::from_secs(5))));
        let (status, _) = classify(&result);
        assert_eq!(status, ExecutionStatus::RateLimited);
    }

    #[test]
    fn classify_honors_a_rate_limited_partial_summary() {
        let result: Result<RunSummary> = Ok(RunSummary {
            players_processed: 3,
            rate_limited: true,
            ..RunSummary::default()
        });
        assert_eq!(classify(&result), (ExecutionStatus::RateLimited, None));
    }

    #[test]
    fn classify_marks_timeouts_and_cancellations() {
        let result: Result<RunSummary> = Err((ErrorKind::Timeout, "watchdog").into());
        assert_eq!(
            classify(&result),
            (ExecutionStatus::Failed, Some("timeout".to_string()))
        );
        let result: Result<RunSummary> = Err((ErrorKind::Cancelled, "shutdown").into());
        assert_eq!(
            classify(&result),
            (ExecutionStatus::Failed, Some("cancelled".to_string()))
        );
    }

    #[test]
    fn classify_prefixes_config_failures() {
        let result: Result<RunSummary> =
            Err((ErrorKind::ConfigInvalid, "scoring weights do not sum to 1.0").into());
        let (status, marker) = classify(&result);
        assert_eq!(status, ExecutionStatus::Failed);
        assert!(marker.unwrap().starts_with("config:"));
    }

    #[test]
    fn run_log_renders_levels_and_order() {
        let log = RunLog::new();
        log.info("first");
        log.warn("second");
        let rendered = log.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO") && lines[0].ends_with("first"));
        assert!(lines[1].contains("WARN") && lines[1].ends_with("second"));
    }
}
