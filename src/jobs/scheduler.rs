//! Single-process scheduling engine.
//!
//! On startup the scheduler loads enabled job configurations, parses each
//! schedule and spawns one ticker per job; tickers persist their computed
//! next-fire time and dispatch executions into the runner. Schedule changes
//! re-register the affected triggers in place via the reload channel, and
//! shutdown waits a grace period for in-flight executions before they are
//! cancelled and recorded as failed.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::{self, DbPool};
use crate::domain::error::{ErrorKind, Result};
use crate::domain::jobs::{JobConfiguration, JobKind};
use crate::jobs::runner::{JobRunner, Launch};
use crate::jobs::Job;

/// A parsed schedule expression: `@every <n><s|m|h|d>` intervals or a
/// standard cron expression (seconds field included).
#[derive(Debug, Clone)]
pub enum ScheduleSpec {
    Every(Duration),
    Cron(Box<cron::Schedule>),
}

impl ScheduleSpec {
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if let Some(rest) = expression.strip_prefix("@every ") {
            let rest = rest.trim();
            let (digits, unit) = rest.split_at(rest.len().saturating_sub(1));
            let value: u64 = digits.trim().parse().map_err(|_| {
                crate::Error::from((
                    ErrorKind::ConfigInvalid,
                    "invalid interval expression",
                    expression.to_string(),
                ))
            })?;
            let seconds = match unit {
                "s" => value,
                "m" => value * 60,
                "h" => value * 3600,
                "d" => value * 86_400,
                _ => {
                    return Err((
                        ErrorKind::ConfigInvalid,
                        "invalid interval unit",
                        expression.to_string(),
                    )
                        .into());
                }
            };
            if seconds == 0 {
                return Err((
                    ErrorKind::ConfigInvalid,
                    "interval must be positive",
                    expression.to_string(),
                )
                    .into());
            }
            return Ok(ScheduleSpec::Every(Duration::from_secs(seconds)));
        }

        let schedule = cron::Schedule::from_str(expression).map_err(|err| {
            crate::Error::from((
                ErrorKind::ConfigInvalid,
                "invalid cron expression",
                format!("{expression}: {err}"),
            ))
        })?;
        Ok(ScheduleSpec::Cron(Box::new(schedule)))
    }

    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleSpec::Every(interval) => {
                Some(after + chrono::Duration::from_std(*interval).ok()?)
            }
            ScheduleSpec::Cron(schedule) => schedule.after(&after).next(),
        }
    }
}

pub struct Scheduler {
    pool: DbPool,
    runner: Arc<JobRunner>,
    jobs: HashMap<JobKind, Arc<dyn Job>>,
    shutdown: CancellationToken,
    /// Fired by [`Scheduler::drain`] once the grace period lapses; the
    /// runner's executions watch this token, not the shutdown signal.
    force_cancel: CancellationToken,
    reload_rx: watch::Receiver<u32>,
    shutdown_grace: Duration,
}

impl Scheduler {
    pub fn new(
        pool: DbPool,
        runner: Arc<JobRunner>,
        registry: Vec<Arc<dyn Job>>,
        shutdown: CancellationToken,
        force_cancel: CancellationToken,
        reload_rx: watch::Receiver<u32>,
        shutdown_grace: Duration,
    ) -> Self {
        let jobs = registry.into_iter().map(|job| (job.kind(), job)).collect();
        Self {
            pool,
            runner,
            jobs,
            shutdown,
            force_cancel,
            reload_rx,
            shutdown_grace,
        }
    }

    /// Runs until the shutdown token fires. Each reload signal tears down
    /// the current set of tickers and re-registers from the database, so
    /// operator toggles and schedule edits apply without restart.
    pub async fn run(mut self) -> Result<()> {
        info!("Scheduler starting");
        loop {
            let generation = self.shutdown.child_token();
            let tickers = self.register_tickers(&generation)?;
            info!("Scheduler registered {} triggers", tickers.len());

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.drain().await;
                    return Ok(());
                }
                changed = self.reload_rx.changed() => {
                    if changed.is_err() {
                        // Every control handle is gone; behave like shutdown.
                        self.drain().await;
                        return Ok(());
                    }
                    info!("Scheduler reloading job configurations");
                    generation.cancel();
                    for ticker in tickers {
                        let _ = ticker.await;
                    }
                }
            }
        }
    }

    /// Spawns one ticker per enabled, registered job. A configuration row
    /// without a job implementation is skipped with a warning; a job kind
    /// without its configuration row is never registered, so no execution
    /// can be persisted against an absent configuration.
    fn register_tickers(&self, generation: &CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        let mut conn = self.pool.get()?;
        let configs = db::job_configurations::list_enabled(&mut conn)?;
        drop(conn);

        let mut tickers = Vec::new();
        let mut registered = std::collections::HashSet::new();
        for config in configs {
            let Some(job) = self.jobs.get(&config.job_type) else {
                warn!(
                    "No implementation registered for configured job {}; skipping",
                    config.job_type
                );
                continue;
            };
            let spec = match ScheduleSpec::parse(&config.schedule) {
                Ok(spec) => spec,
                Err(err) => {
                    error!(
                        "Refusing to register {} with invalid schedule {:?}: {err}",
                        config.job_type, config.schedule
                    );
                    continue;
                }
            };
            registered.insert(config.job_type);
            tickers.push(self.spawn_ticker(
                Arc::clone(job),
                config,
                spec,
                generation.child_token(),
            ));
        }

        for kind in self.jobs.keys() {
            if !registered.contains(kind) {
                debug!("Job {kind} has no enabled configuration");
            }
        }
        Ok(tickers)
    }

    fn spawn_ticker(
        &self,
        job: Arc<dyn Job>,
        config: JobConfiguration,
        spec: ScheduleSpec,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let runner = Arc::clone(&self.runner);

        tokio::spawn(async move {
            loop {
                let Some(fire_at) = spec.next_fire(Utc::now()) else {
                    warn!("Schedule for {} yields no further fires", config.job_type);
                    return;
                };

                if let Ok(mut conn) = pool.get() {
                    if let Err(err) = db::scheduler_state::record_next_fire(
                        &mut conn,
                        config.job_type,
                        Some(fire_at),
                    ) {
                        warn!("Failed to persist next fire time: {err}");
                    }
                }

                let wait = (fire_at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(wait) => {}
                }

                match runner.launch(Arc::clone(&job), &config) {
                    Ok(Launch::Started { execution, handle }) => {
                        debug!(
                            "{} fired, execution {}",
                            config.job_type, execution.id
                        );
                        // Serialize fires of the same job; a run outlasting
                        // its interval delays the next fire instead of
                        // stacking skipped rows.
                        let _ = handle.await;
                    }
                    Ok(Launch::Busy) => {
                        warn!(
                            "{} fired while a previous execution is running; skipping",
                            config.job_type
                        );
                        if let Ok(mut conn) = pool.get() {
                            if let Err(err) =
                                db::job_executions::insert_skipped(&mut conn, config.id)
                            {
                                warn!("Failed to record skipped execution: {err}");
                            }
                        }
                    }
                    Err(err) => {
                        error!("Failed to launch {}: {err}", config.job_type);
                    }
                }
            }
        })
    }

    /// Waits up to the grace period for in-flight executions to terminate on
    /// their own. Only after the deadline does it fire the force-cancel
    /// token the runner tasks watch; the cancelled runs then close their own
    /// ledger rows as failed, and a short second wait lets those final
    /// writes land before the process exits.
    async fn drain(&self) {
        info!(
            "Scheduler draining, waiting up to {}s for in-flight executions",
            self.shutdown_grace.as_secs()
        );
        let guards = self.runner.guards();
        let idle = || !JobKind::ALL.iter().any(|kind| guards.is_running(*kind));

        let deadline = tokio::time::Instant::now() + self.shutdown_grace;
        while tokio::time::Instant::now() < deadline {
            if idle() {
                info!("All executions terminated before the grace deadline");
                return;
            }
            sleep(Duration::from_millis(200)).await;
        }

        warn!("Grace period expired with executions still running; cancelling");
        self.force_cancel.cancel();

        let closing = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < closing {
            if idle() {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        warn!("Cancelled executions did not acknowledge in time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};

    #[test]
    fn interval_expressions_parse() {
        let spec = assert_ok!(ScheduleSpec::parse("@every 90s"));
        let now = Utc::now();
        assert_eq!(
            spec.next_fire(now),
            Some(now + chrono::Duration::seconds(90))
        );

        assert_ok!(ScheduleSpec::parse("@every 15m"));
        assert_ok!(ScheduleSpec::parse("@every 2h"));
        assert_ok!(ScheduleSpec::parse("@every 1d"));
    }

    #[test]
    fn cron_expressions_parse_and_fire_in_the_future() {
        let spec = assert_ok!(ScheduleSpec::parse("0 */10 * * * *"));
        let now = Utc::now();
        let next = spec.next_fire(now).unwrap();
        assert!(next > now);
        assert!(next <= now + chrono::Duration::minutes(10));
    }

    #[test]
    fn malformed_schedules_are_refused() {
        assert_err!(ScheduleSpec::parse("@every 15x"));
        assert_err!(ScheduleSpec::parse("@every 0m"));
        assert_err!(ScheduleSpec::parse("not a schedule"));
        assert_err!(ScheduleSpec::parse(""));
    }
}
