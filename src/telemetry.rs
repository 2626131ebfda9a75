//! Process-wide tracing setup.
//!
//! Console output follows `RUST_LOG`; every record is additionally mirrored
//! to a size-capped rotating file under `log/`, so a headless ingest box
//! keeps a short on-disk history without growing unbounded. This is distinct
//! from per-execution log capture: the job framework buffers those records
//! separately into the execution ledger.

use std::fs::create_dir_all;
use std::path::PathBuf;
use std::sync::Mutex;

use logs_wheel::LogFileInitializer;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;

const LOG_DIR: &str = "log";
const LOG_FILE: &str = "riftguard.log";

/// Installs the global subscriber: env-filtered console output plus the
/// rotating file sink. Call once, before any component logs.
pub fn init_tracing() -> crate::Result<()> {
    let log_dir = PathBuf::from(LOG_DIR);
    create_dir_all(&log_dir)?;

    let rotating = LogFileInitializer {
        max_n_old_files: 2,
        directory: log_dir,
        filename: LOG_FILE,
        preferred_max_file_size_mib: 1,
    }
    .init()?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish()
        .with(
            fmt::Layer::default()
                .with_writer(Mutex::new(rotating))
                .with_ansi(false),
        );
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global default.");

    Ok(())
}
