#![allow(dead_code)]

mod helpers;
pub mod stub_riot;

use std::env;
use std::sync::LazyLock;

use diesel::{Connection, PgConnection, RunQueryDsl, sql_query};
use riftguard::Result;
use riftguard::configuration::{DatabaseSettings, Settings, get_settings};
use riftguard::db::connection::{DbPool, PooledConn, initialize_pool};
use riftguard::db::migrations::run_pending;
use riftguard::domain::app_state::App;
use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt, registry};
use uuid::Uuid;

pub use helpers::*;

/// Test harness containing the assembled application over an isolated
/// database. No scheduler is started; tests drive the runner, the control
/// surface and the data manager directly.
pub struct TestHarness {
	/// The assembled application state
	pub app: App,
	/// Database connection pool for direct database access in tests
	pub db_pool: DbPool,
}

impl TestHarness {
	/// Initializes a harness whose external API client points at the real
	/// provider hosts. Suitable for tests that never leave the database.
	pub fn new() -> Self {
		Self::build(None)
	}

	/// Initializes a harness whose external API client routes every host to
	/// the given stub server base URL.
	pub fn with_api_base(base: impl Into<String>) -> Self {
		Self::build(Some(base.into()))
	}

	fn build(api_base: Option<String>) -> Self {
		// Ensure tracing is initialized for test output
		LazyLock::force(&TRACING);

		let mut settings = get_settings().expect("Failed to read configuration");
		settings.riot.api_key = Some(SecretString::new("test-api-key".into()));
		// Small pools keep parallel test binaries inside the server's
		// connection limit.
		settings.database.pool_size = Some(2);

		// Create an isolated test database and update settings
		let (db_pool, updated_db_settings) = create_isolated_test_database(&mut settings.database);
		settings.database = updated_db_settings.clone();

		let app = match api_base {
			Some(base) => App::with_api_base(db_pool.clone(), settings, base),
			None => App::with_pool(db_pool.clone(), settings),
		}
		.expect("Failed to assemble application state");

		Self { app, db_pool }
	}

	/// Builds a harness with modified settings (e.g. broken scoring weights).
	pub fn with_settings(
		mutate: impl FnOnce(&mut Settings),
		api_base: Option<String>,
	) -> Self {
		LazyLock::force(&TRACING);

		let mut settings = get_settings().expect("Failed to read configuration");
		settings.riot.api_key = Some(SecretString::new("test-api-key".into()));
		settings.database.pool_size = Some(2);
		let (db_pool, updated_db_settings) = create_isolated_test_database(&mut settings.database);
		settings.database = updated_db_settings.clone();
		mutate(&mut settings);

		let app = match api_base {
			Some(base) => App::with_api_base(db_pool.clone(), settings, base),
			None => App::with_pool(db_pool.clone(), settings),
		}
		.expect("Failed to assemble application state");

		Self { app, db_pool }
	}

	pub fn get_conn(&self) -> PooledConn {
		self.db_pool.get().expect("Failed to get connection")
	}
}

/// Creates an isolated test database with a unique name and runs migrations
/// and seeds.
///
/// # Arguments
/// * `config` - Mutable reference to database settings that will be updated
///
/// # Returns
/// A tuple containing:
/// - [`DbPool`] - Connection pool for the test database
/// - [`DatabaseSettings`] - Updated database configuration
fn create_isolated_test_database(config: &mut DatabaseSettings) -> (DbPool, &mut DatabaseSettings) {
	// Generate unique database name to avoid conflicts between concurrent tests
	config.database_name = format!("riftguard_test_{}", Uuid::new_v4().simple());

	// Create connection settings for the PostgreSQL system database
	let mut system_db_settings = config.clone();
	system_db_settings.database_name = "postgres".to_string();
	system_db_settings.username = "postgres".to_string();
	system_db_settings.password = SecretString::new("password".into());
	system_db_settings.pool_size = Some(1);

	// Connect to the system database and create the test database
	let mut system_conn =
		PgConnection::establish(system_db_settings.connection_string().expose_secret())
			.expect("Failed to connect to PostgreSQL system database");

	sql_query(format!(r#"CREATE DATABASE "{}";"#, config.database_name).as_str())
		.execute(&mut system_conn)
		.expect("Failed to create test database");

	// Switch to the newly created test database for permission setup
	system_db_settings.database_name = config.database_name.clone();
	let mut test_db_conn =
		PgConnection::establish(system_db_settings.connection_string().expose_secret())
			.expect("Failed to connect to test database");

	grant_database_permissions(&mut test_db_conn, &config.database_name, &config.username);

	// Connect with application credentials and run migrations + seeds
	let mut app_conn = PgConnection::establish(config.connection_string().expose_secret())
		.expect("Failed to connect to test database with application credentials");

	run_pending(&mut app_conn).expect("Failed to run database migrations");
	riftguard::db::seeds::run(&mut app_conn).expect("Failed to run database seeds");

	(initialize_pool(config), config)
}

/// Grants comprehensive database permissions to the specified user.
fn grant_database_permissions(conn: &mut PgConnection, database_name: &str, username: &str) {
	sql_query(format!(r#"GRANT ALL ON DATABASE "{database_name}" TO "{username}";"#).as_str())
		.execute(conn)
		.expect("Failed to grant database privileges");

	sql_query(format!(r#"GRANT USAGE, CREATE ON SCHEMA public TO "{username}";"#).as_str())
		.execute(conn)
		.expect("Failed to grant schema privileges");

	sql_query(format!(r#"GRANT ALL ON ALL TABLES IN SCHEMA public TO "{username}";"#).as_str())
		.execute(conn)
		.expect("Failed to grant table privileges");

	sql_query(
		format!(
			r#"ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT ALL ON TABLES TO "{username}";"#
		)
		.as_str(),
	)
	.execute(conn)
	.expect("Failed to set default table privileges");
}

/// Global tracing initialization for tests, initialized lazily.
static TRACING: LazyLock<Result<()>> = LazyLock::new(configure_test_tracing);

/// Configures tracing for the test environment.
///
/// The configuration depends on the `TEST_LOG` environment variable:
/// - If `TEST_LOG` is set: Enables test-friendly output with visible logs
/// - If `TEST_LOG` is not set: Uses minimal logging to avoid test output noise
fn configure_test_tracing() -> Result<()> {
	let subscriber =
		registry().with(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()));

	if env::var("TEST_LOG").is_ok() {
		let subscriber_with_fmt = subscriber.with(fmt::Layer::new().with_test_writer());
		tracing::subscriber::set_global_default(subscriber_with_fmt)
			.expect("Failed to set global tracing subscriber");
	} else {
		tracing::subscriber::set_global_default(subscriber)
			.expect("Failed to set global tracing subscriber");
	}

	Ok(())
}
