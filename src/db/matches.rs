//! Database access layer for matches and their participant batches.
//!
//! A match and its participants are written in one transaction; a stored
//! match is immutable apart from the processing flag.

use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::matches::{Match, MatchId, NewMatch};
use crate::domain::participant::NewMatchParticipant;
use crate::schema::match_participants;
use crate::schema::matches::dsl::*;

/// Attempts to find a match by its provider-assigned id.
pub fn find_by_id(conn: &mut DbConn, id: &str) -> Result<Option<Match>> {
	let m: Option<Match> = matches.find(id).first(conn).optional()?;
	Ok(m)
}

/// Checks whether a match is already stored.
pub fn exists(conn: &mut DbConn, id: &str) -> Result<bool> {
	Ok(find_by_id(conn, id)?.is_some())
}

/// Inserts a match together with its participant batch in one transaction.
///
/// Re-inserting an already stored match is a no-op returning the stored row,
/// so ensuring the same match twice stays idempotent. Partial writes are not
/// possible: either the match row and every participant land, or nothing does.
pub fn insert_with_participants(
	conn: &mut DbConn,
	new_match: NewMatch,
	participants: Vec<NewMatchParticipant>,
) -> Result<Match> {
	conn.transaction(|conn| -> Result<Match> {
		if let Some(existing) = matches
			.find(&new_match.match_id)
			.first::<Match>(conn)
			.optional()?
		{
			return Ok(existing);
		}

		let stored = diesel::insert_into(matches)
			.values(&new_match)
			.returning(Match::as_returning())
			.get_result(conn)?;

		diesel::insert_into(match_participants::table)
			.values(&participants)
			.execute(conn)?;

		Ok(stored)
	})
}

/// Marks a stored match as processed. The only mutation a completed match
/// permits.
pub fn mark_processed(conn: &mut DbConn, id: &MatchId) -> Result<usize> {
	let updated = diesel::update(matches.find(id))
		.set(is_processed.eq(true))
		.execute(conn)?;
	Ok(updated)
}

/// Ids from the given list that are not yet stored, preserving input order.
pub fn missing_ids(conn: &mut DbConn, ids: &[MatchId]) -> Result<Vec<MatchId>> {
	let stored: Vec<MatchId> = matches
		.filter(match_id.eq_any(ids))
		.select(match_id)
		.load(conn)?;
	Ok(ids
		.iter()
		.filter(|id| !stored.contains(id))
		.cloned()
		.collect())
}

/// Provider ids of the player's most recent stored matches, newest first.
/// The cached answer for a stale match-id listing.
pub fn recent_ids_for_player(
	conn: &mut DbConn,
	player_puuid: &str,
	limit: i64,
) -> Result<Vec<MatchId>> {
	let ids = match_participants::table
		.inner_join(matches)
		.filter(match_participants::puuid.eq(player_puuid))
		.order(game_creation.desc())
		.limit(limit)
		.select(match_id)
		.load(conn)?;
	Ok(ids)
}

/// Number of stored matches a player appears in.
pub fn count_for_player(conn: &mut DbConn, player_puuid: &str) -> Result<i64> {
	let count = match_participants::table
		.filter(match_participants::puuid.eq(player_puuid))
		.count()
		.get_result(conn)?;
	Ok(count)
}
