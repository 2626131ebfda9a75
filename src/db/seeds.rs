//! SQL seed data.
//!
//! `seeds/` holds numbered files (`01_job_configurations.sql`, ...) applied
//! in filename order. Every statement is idempotent via `ON CONFLICT DO
//! NOTHING`, so seeding is safe to repeat after a deploy or a schema reset.
//! The default job configurations live here; the scheduler refuses to
//! register a job kind without its configuration row, so seeding must run
//! before the scheduler starts.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use diesel::PgConnection;
use diesel::connection::SimpleConnection;
use tracing::{info, warn};

/// Applies every `seeds/*.sql` file in filename order.
///
/// A missing `seeds/` directory is tolerated with a warning: an operator may
/// have seeded the configurations by hand, and the scheduler will refuse any
/// job kind that ends up without a row either way.
///
/// # Errors
///
/// Returns an error when the directory or a file cannot be read, or when a
/// statement inside a file fails.
pub fn run(conn: &mut PgConnection) -> Result<()> {
	let seeds_dir = Path::new("seeds");
	if !seeds_dir.exists() {
		warn!("No seeds directory found; job configurations must already exist");
		return Ok(());
	}

	let mut seed_files: Vec<_> = fs::read_dir(seeds_dir)
		.context("Failed to read seeds directory")?
		.filter_map(|entry| entry.ok())
		.filter(|entry| {
			entry
				.path()
				.extension()
				.map(|ext| ext == "sql")
				.unwrap_or(false)
		})
		.collect();

	// The NN_ filename prefix is the ordering contract.
	seed_files.sort_by_key(|entry| entry.file_name());

	if seed_files.is_empty() {
		info!("Seeds directory is empty, nothing to apply");
		return Ok(());
	}

	let count = seed_files.len();
	for entry in seed_files {
		let path = entry.path();
		let filename = path.file_name().unwrap().to_string_lossy();

		let sql = fs::read_to_string(&path)
			.with_context(|| format!("Failed to read seed file: {}", filename))?;

		// batch_execute runs the whole file as one script.
		conn.batch_execute(&sql)
			.with_context(|| format!("Failed to execute seed file: {}", filename))?;

		info!("Applied seed file {}", filename);
	}

	info!("Applied {count} seed files");

	Ok(())
}
