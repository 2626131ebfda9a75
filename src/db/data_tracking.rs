//! Database access layer for the data-tracking table the freshness policy
//! runs on. One row per `(data_type, identifier)`.

use chrono::Utc;
use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::tracking::{DataKind, DataTracking};
use crate::schema::data_tracking::dsl::*;

/// Attempts to find the tracker row for an entity.
pub fn find(conn: &mut DbConn, kind: DataKind, ident: &str) -> Result<Option<DataTracking>> {
	let tracker: Option<DataTracking> = data_tracking
		.filter(data_type.eq(kind))
		.filter(identifier.eq(ident))
		.first(conn)
		.optional()?;
	Ok(tracker)
}

/// Increments the hit counter, creating the row when absent. Called on every
/// read regardless of which branch serves it.
pub fn record_hit(conn: &mut DbConn, kind: DataKind, ident: &str) -> Result<()> {
	diesel::insert_into(data_tracking)
		.values((data_type.eq(kind), identifier.eq(ident), hit_count.eq(1)))
		.on_conflict((data_type, identifier))
		.do_update()
		.set((hit_count.eq(hit_count + 1), updated_at.eq(Utc::now())))
		.execute(conn)?;
	Ok(())
}

/// Records a successful external fetch: bumps the fetch counter, advances
/// the fetch/update watermarks and clears any tombstone.
pub fn record_fetch(conn: &mut DbConn, kind: DataKind, ident: &str) -> Result<()> {
	let now = Utc::now();
	diesel::insert_into(data_tracking)
		.values((
			data_type.eq(kind),
			identifier.eq(ident),
			last_fetched.eq(Some(now)),
			last_updated.eq(Some(now)),
			fetch_count.eq(1),
		))
		.on_conflict((data_type, identifier))
		.do_update()
		.set((
			last_fetched.eq(Some(now)),
			last_updated.eq(Some(now)),
			fetch_count.eq(fetch_count + 1),
			not_found.eq(false),
			updated_at.eq(now),
		))
		.execute(conn)?;
	Ok(())
}

/// Marks an identifier as absent upstream (404 tombstone). The fetch counter
/// still advances; the freshness watermark does too, so the tombstone is
/// honored for a full TTL before re-probing.
pub fn record_not_found(conn: &mut DbConn, kind: DataKind, ident: &str) -> Result<()> {
	let now = Utc::now();
	diesel::insert_into(data_tracking)
		.values((
			data_type.eq(kind),
			identifier.eq(ident),
			last_fetched.eq(Some(now)),
			fetch_count.eq(1),
			not_found.eq(true),
		))
		.on_conflict((data_type, identifier))
		.do_update()
		.set((
			last_fetched.eq(Some(now)),
			fetch_count.eq(fetch_count + 1),
			not_found.eq(true),
			updated_at.eq(now),
		))
		.execute(conn)?;
	Ok(())
}
