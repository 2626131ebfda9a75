//! Database access layer for match participant snapshots.

use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::matches::Match;
use crate::domain::participant::MatchParticipant;
use crate::schema::{match_participants, matches};

/// All participants of one match.
pub fn for_match(conn: &mut DbConn, match_id: &str) -> Result<Vec<MatchParticipant>> {
	let rows = match_participants::table
		.filter(match_participants::match_id.eq(match_id))
		.order(match_participants::team_id.asc())
		.select(MatchParticipant::as_select())
		.load(conn)?;
	Ok(rows)
}

/// The player's most recent participant snapshots joined with their matches,
/// newest game first. This is the scoring engine's input window.
pub fn recent_for_player(
	conn: &mut DbConn,
	puuid: &str,
	window: i64,
) -> Result<Vec<(MatchParticipant, Match)>> {
	let rows = match_participants::table
		.inner_join(matches::table)
		.filter(match_participants::puuid.eq(puuid))
		.order(matches::game_creation.desc())
		.limit(window)
		.select((MatchParticipant::as_select(), Match::as_select()))
		.load(conn)?;
	Ok(rows)
}

/// Distinct player ids seen in stored matches. Used to widen the ingestion
/// graph beyond tracked players.
pub fn distinct_puuids(conn: &mut DbConn) -> Result<Vec<String>> {
	let rows = match_participants::table
		.select(match_participants::puuid)
		.distinct()
		.load(conn)?;
	Ok(rows)
}
