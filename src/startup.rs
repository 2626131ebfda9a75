//! Process startup and lifecycle management.
//!
//! Responsible for assembling the application state, starting the scheduler
//! and handling system signals for graceful termination. Startup ordering
//! matters: migrations and seeds run in `main` before this module is
//! entered, so the scheduler never sees a database without job
//! configuration rows.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::configuration::Settings;
use crate::db::DbPool;
use crate::domain::app_state::App;
use crate::Result;

/// Launches the ingestion core with the given configuration and pool and
/// blocks until a termination signal has been handled.
///
/// Performs, in order: application state assembly, closing of stale ledger
/// rows from a previous process, scheduler start, and on signal a graceful
/// drain bounded by the configured grace period.
pub async fn launch(config: Settings, pool: DbPool) -> Result<()> {
    let app = App::with_pool(pool, config)?;
    app.runner.close_stale_executions()?;

    let token = app.shutdown.clone();
    let scheduler = app.scheduler();
    let scheduler_handle = tokio::spawn(scheduler.run());
    info!("Riftguard core started");

    shutdown_signal(token).await;

    match scheduler_handle.await {
        Ok(result) => result,
        Err(err) => {
            warn!("Scheduler task ended abnormally: {err}");
            Ok(())
        }
    }
}

/// Waits for a shutdown signal in the application.
///
/// This function listens for two types of signals:
/// - `Ctrl+C` signal on all platforms.
/// - `SIGTERM` signal on Unix-based systems.
///
/// When any of these signals is received, the cancellation token fires and
/// the scheduler begins its graceful drain.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => token.cancel(),
        _ = terminate => token.cancel(),
    }

    info!("Shutting down...");
}
