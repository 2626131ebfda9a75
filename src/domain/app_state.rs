//! Application state assembly.
//!
//! All process-wide mutable state (rate-limiter buckets, single-flight map,
//! run guards) lives inside the components constructed here and is passed
//! explicitly into the scheduler, the jobs and the data manager. There are
//! no process-wide singletons.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::configuration::Settings;
use crate::data::{DataManager, FreshnessPolicy};
use crate::db::DbPool;
use crate::domain::error::Result;
use crate::jobs::control::JobControl;
use crate::jobs::runner::JobRunner;
use crate::jobs::scheduler::Scheduler;
use crate::jobs::{Job, RunGuards, registry};
use crate::riot::{ConfigApiKey, RateLimiter, RiotClient};

/// Core application state shared across the scheduler, jobs and operator
/// surfaces.
pub struct App {
    pub pool: DbPool,
    pub settings: Settings,
    pub client: Arc<RiotClient>,
    pub data: Arc<DataManager>,
    pub runner: Arc<JobRunner>,
    pub control: Arc<JobControl>,
    /// Fires when the process should begin its graceful shutdown.
    pub shutdown: CancellationToken,
    /// Fires only once the shutdown grace period has lapsed; executions
    /// still in flight are force-cancelled through this token.
    force_cancel: CancellationToken,
    jobs: Vec<Arc<dyn Job>>,
    reload_rx: watch::Receiver<u32>,
}

impl App {
    /// Constructs the application around an existing database pool.
    pub fn with_pool(pool: DbPool, settings: Settings) -> Result<Self> {
        Self::build(pool, settings, None)
    }

    /// Like [`App::with_pool`], but routes every external API host to one
    /// base URL. Used by the test suites to drive the full stack against a
    /// local stub server.
    pub fn with_api_base(pool: DbPool, settings: Settings, base: impl Into<String>) -> Result<Self> {
        Self::build(pool, settings, Some(base.into()))
    }

    fn build(pool: DbPool, settings: Settings, api_base: Option<String>) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new((&settings.riot).into()));
        let keys = Arc::new(ConfigApiKey::from(&settings.riot));
        let mut client = RiotClient::new(&settings.riot, pool.clone(), limiter, keys)?;
        if let Some(base) = api_base {
            client = client.with_host_override(base);
        }
        let client = Arc::new(client);

        let data = Arc::new(DataManager::new(
            pool.clone(),
            Arc::clone(&client),
            FreshnessPolicy::new(settings.freshness.clone()),
            Duration::from_secs(settings.scheduler.admission_wait_seconds),
        ));

        let shutdown = CancellationToken::new();
        let force_cancel = CancellationToken::new();
        let guards = Arc::new(RunGuards::new());
        let runner = Arc::new(JobRunner::new(pool.clone(), guards, force_cancel.clone()));

        let jobs = registry(pool.clone(), Arc::clone(&data), settings.scoring.clone());
        let (reload_tx, reload_rx) = watch::channel(0u32);
        let control = Arc::new(JobControl::new(
            pool.clone(),
            Arc::clone(&runner),
            &jobs,
            reload_tx,
        ));

        Ok(Self {
            pool,
            settings,
            client,
            data,
            runner,
            control,
            shutdown,
            force_cancel,
            jobs,
            reload_rx,
        })
    }

    /// Builds the scheduling engine over this state. The scheduler owns its
    /// run loop; build it once per process lifetime.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.pool.clone(),
            Arc::clone(&self.runner),
            self.jobs.clone(),
            self.shutdown.clone(),
            self.force_cancel.clone(),
            self.reload_rx.clone(),
            Duration::from_secs(self.settings.scheduler.shutdown_grace_seconds),
        )
    }
}
