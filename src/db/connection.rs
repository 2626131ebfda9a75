use anyhow::Result;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use secrecy::ExposeSecret;
use std::fmt::Display;
use tracing::{debug, info};

use crate::configuration::DatabaseSettings;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
/// A live connection checked out of the pool. Derefs to [`DbConn`], so it can
/// be handed to any query function directly.
pub type PooledConn = PooledConnection<ConnectionManager<PgConnection>>;
/// Connection type the query layer operates on. Plain `PgConnection` so the
/// same functions compose inside and outside transactions.
pub type DbConn = PgConnection;

/// Creates a new database pool using the provided database URL.
fn create_pool<S: Display>(database_url: S) -> Result<DbPool> {
	create_pool_with_size(database_url, None)
}

/// Creates a new database pool from the given `DatabaseSettings`.
pub fn create_pool_from_settings(settings: &DatabaseSettings) -> Result<DbPool> {
	create_pool_with_size(
		settings.connection_string().expose_secret(),
		settings.pool_size,
	)
}

/// Creates a new database pool with an optional pool size.
fn create_pool_with_size<S: Display>(database_url: S, pool_size: Option<u32>) -> Result<DbPool> {
	assert_ne!(pool_size, Some(0), "r2d2 pool size must be greater than 0");

	let database_url = format!("{}", database_url);
	info!("Connecting to database");

	let manager = ConnectionManager::<PgConnection>::new(database_url);
	let builder = Pool::builder().test_on_check_out(true);
	let pool = match pool_size {
		Some(size) => builder.max_size(size).build(manager)?,
		None => builder.build(manager)?,
	};

	debug!("Connection pool created. {:#?}", pool.state());
	Ok(pool)
}

/// Initializes the database pool based on the provided settings.
pub fn initialize_pool(settings: &DatabaseSettings) -> DbPool {
	match settings.pool_size {
		Some(size) => {
			debug!("Creating connection pool with size: {}", size);
			create_pool_from_settings(settings).unwrap()
		}
		None => {
			debug!("Creating connection pool with default size");
			create_pool(settings.connection_string().expose_secret()).unwrap()
		}
	}
}
