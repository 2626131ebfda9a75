//! Database access layer for smurf detection results. Append-only.

use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::detection::{NewSmurfDetection, SmurfDetection};
use crate::domain::error::Result;
use crate::schema::smurf_detections::dsl::*;

/// Appends one analysis result. Prior rows are retained.
pub fn insert(conn: &mut DbConn, entity: NewSmurfDetection) -> Result<SmurfDetection> {
	let detection = diesel::insert_into(smurf_detections)
		.values(&entity)
		.returning(SmurfDetection::as_returning())
		.get_result(conn)?;
	Ok(detection)
}

/// The most recent analysis for a player, if any.
pub fn latest_for_player(conn: &mut DbConn, player_puuid: &str) -> Result<Option<SmurfDetection>> {
	let detection: Option<SmurfDetection> = smurf_detections
		.filter(puuid.eq(player_puuid))
		.order(created_at.desc())
		.first(conn)
		.optional()?;
	Ok(detection)
}

/// Every stored analysis for a player, newest first.
pub fn history_for_player(conn: &mut DbConn, player_puuid: &str) -> Result<Vec<SmurfDetection>> {
	let detections = smurf_detections
		.filter(puuid.eq(player_puuid))
		.order(created_at.desc())
		.select(SmurfDetection::as_select())
		.load(conn)?;
	Ok(detections)
}
