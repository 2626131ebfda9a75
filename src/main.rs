use diesel::{Connection, PgConnection};
use secrecy::ExposeSecret;
use tracing::info;

use riftguard::configuration::get_settings;
use riftguard::db::connection::initialize_pool;
use riftguard::db::{migrations, seeds};
use riftguard::{startup, telemetry};

#[tokio::main]
async fn main() -> riftguard::Result<()> {
    telemetry::init_tracing()?;
    info!("Starting Riftguard...");

    let settings = get_settings()?;

    // Schema first, then seeds, then the scheduler: the scheduler refuses
    // jobs without configuration rows, so this ordering is load-bearing.
    let mut conn =
        PgConnection::establish(settings.database.connection_string().expose_secret())
            .map_err(|err| anyhow::anyhow!("failed to connect for migrations: {err}"))?;
    migrations::run_pending(&mut conn)
        .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
    seeds::run(&mut conn)?;
    drop(conn);

    let pool = initialize_pool(&settings.database);
    startup::launch(settings, pool).await
}
