//! Next-fire bookkeeping for the in-process scheduling engine.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::jobs::JobKind;
use crate::schema::scheduler_state::dsl::*;

/// Persists the computed next fire time for a job kind.
pub fn record_next_fire(
	conn: &mut DbConn,
	kind: JobKind,
	fire_at: Option<DateTime<Utc>>,
) -> Result<()> {
	diesel::insert_into(scheduler_state)
		.values((job_type.eq(kind), next_fire_at.eq(fire_at)))
		.on_conflict(job_type)
		.do_update()
		.set((next_fire_at.eq(fire_at), updated_at.eq(Utc::now())))
		.execute(conn)?;
	Ok(())
}

/// The persisted next fire time for a job kind, if one was recorded.
pub fn next_fire(conn: &mut DbConn, kind: JobKind) -> Result<Option<DateTime<Utc>>> {
	let fire_at: Option<Option<DateTime<Utc>>> = scheduler_state
		.find(kind)
		.select(next_fire_at)
		.first(conn)
		.optional()?;
	Ok(fire_at.flatten())
}
