//! Append-only log of throttling events observed against the external API.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::rate_limit::{NewRateLimitEvent, RateLimitEvent};
use crate::schema::rate_limit_log::dsl::*;

/// Appends one throttling event.
pub fn append(conn: &mut DbConn, entity: NewRateLimitEvent) -> Result<RateLimitEvent> {
	let event = diesel::insert_into(rate_limit_log)
		.values(&entity)
		.returning(RateLimitEvent::as_returning())
		.get_result(conn)?;
	Ok(event)
}

/// Events recorded inside the window, newest first.
pub fn list_window(conn: &mut DbConn, since: DateTime<Utc>) -> Result<Vec<RateLimitEvent>> {
	let events = rate_limit_log
		.filter(created_at.ge(since))
		.order(created_at.desc())
		.select(RateLimitEvent::as_select())
		.load(conn)?;
	Ok(events)
}
