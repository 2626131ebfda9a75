//! Embedded schema migrations.
//!
//! The core owns its schema (players, matches, ranks, detections, the
//! execution ledger and the tracking tables); collaborators never run DDL
//! against these tables. The migration files are compiled into the binary so
//! both the service and the `seed` bin can bring a fresh database up without
//! the diesel CLI installed.

use std::error::Error;

use diesel::pg::Pg;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Applies every migration not yet recorded in the target database, logging
/// each version it runs. The scheduler must not start before this succeeds:
/// job configurations and the execution ledger live in these tables.
pub fn run_pending(
	connection: &mut impl MigrationHarness<Pg>,
) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
	let applied = connection.run_pending_migrations(MIGRATIONS)?;
	if applied.is_empty() {
		info!("Schema is up to date");
	}
	for version in &applied {
		info!("Applied migration {version}");
	}

	Ok(())
}
