//! Database access layer for job configurations.

use chrono::Utc;
use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::jobs::{JobConfiguration, JobKind, NewJobConfiguration};
use crate::schema::job_configurations::dsl::*;

/// All configurations, stable order.
pub fn list_all(conn: &mut DbConn) -> Result<Vec<JobConfiguration>> {
	let configs = job_configurations
		.order(job_type.asc())
		.select(JobConfiguration::as_select())
		.load(conn)?;
	Ok(configs)
}

/// Enabled configurations only; the scheduler's registration set.
pub fn list_enabled(conn: &mut DbConn) -> Result<Vec<JobConfiguration>> {
	let configs = job_configurations
		.filter(is_active.eq(true))
		.order(job_type.asc())
		.select(JobConfiguration::as_select())
		.load(conn)?;
	Ok(configs)
}

/// Attempts to find the configuration for a job kind.
pub fn find_by_type(conn: &mut DbConn, kind: JobKind) -> Result<Option<JobConfiguration>> {
	let config: Option<JobConfiguration> = job_configurations
		.filter(job_type.eq(kind))
		.first(conn)
		.optional()?;
	Ok(config)
}

/// Inserts a configuration if its job kind has none yet.
pub fn insert_if_absent(conn: &mut DbConn, entity: NewJobConfiguration) -> Result<usize> {
	let inserted = diesel::insert_into(job_configurations)
		.values(&entity)
		.on_conflict(job_type)
		.do_nothing()
		.execute(conn)?;
	Ok(inserted)
}

/// Toggles a job kind on or off.
pub fn set_enabled(conn: &mut DbConn, kind: JobKind, enabled: bool) -> Result<usize> {
	let updated = diesel::update(job_configurations.filter(job_type.eq(kind)))
		.set((is_active.eq(enabled), updated_at.eq(Utc::now())))
		.execute(conn)?;
	Ok(updated)
}

/// Replaces the schedule expression for a job kind.
pub fn update_schedule(conn: &mut DbConn, kind: JobKind, expression: &str) -> Result<usize> {
	let updated = diesel::update(job_configurations.filter(job_type.eq(kind)))
		.set((schedule.eq(expression), updated_at.eq(Utc::now())))
		.execute(conn)?;
	Ok(updated)
}

/// Replaces the tunables blob for a job kind.
pub fn update_settings(
	conn: &mut DbConn,
	kind: JobKind,
	blob: serde_json::Value,
) -> Result<usize> {
	let updated = diesel::update(job_configurations.filter(job_type.eq(kind)))
		.set((settings.eq(blob), updated_at.eq(Utc::now())))
		.execute(conn)?;
	Ok(updated)
}
