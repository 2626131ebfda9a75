//! Standalone schema + seed runner.
//!
//! Lets an integrator prepare the database (migrations, default job
//! configurations) without starting the scheduler, e.g. after a schema
//! reset.

use diesel::{Connection, PgConnection};
use secrecy::ExposeSecret;
use tracing::info;

use riftguard::configuration::get_settings;
use riftguard::db::{migrations, seeds};
use riftguard::telemetry;

fn main() -> riftguard::Result<()> {
    telemetry::init_tracing()?;
    let settings = get_settings()?;

    let mut conn =
        PgConnection::establish(settings.database.connection_string().expose_secret())
            .map_err(|err| anyhow::anyhow!("failed to connect: {err}"))?;
    migrations::run_pending(&mut conn)
        .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
    seeds::run(&mut conn)?;

    info!("Database migrated and seeded");
    Ok(())
}
