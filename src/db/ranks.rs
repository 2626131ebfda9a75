//! Database access layer for player rank snapshots.
//!
//! At most one row per `(puuid, queue_type)` carries `is_current = true`;
//! the rest form the rank history the scoring engine reads.

use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::rank::{NewPlayerRank, PlayerRank};
use crate::schema::player_ranks::dsl::*;

/// Inserts a fresh rank snapshot as current, demoting the previous current
/// row for the same `(puuid, queue_type)` in the same transaction.
pub fn upsert_current(conn: &mut DbConn, entity: NewPlayerRank) -> Result<PlayerRank> {
	conn.transaction(|conn| -> Result<PlayerRank> {
		diesel::update(
			player_ranks
				.filter(puuid.eq(&entity.puuid))
				.filter(queue_type.eq(&entity.queue_type))
				.filter(is_current.eq(true)),
		)
		.set(is_current.eq(false))
		.execute(conn)?;

		let rank = diesel::insert_into(player_ranks)
			.values(&entity)
			.returning(PlayerRank::as_returning())
			.get_result(conn)?;
		Ok(rank)
	})
}

/// The player's current rank for the given queue, if any.
pub fn current_for_queue(
	conn: &mut DbConn,
	player_puuid: &str,
	queue: &str,
) -> Result<Option<PlayerRank>> {
	let rank: Option<PlayerRank> = player_ranks
		.filter(puuid.eq(player_puuid))
		.filter(queue_type.eq(queue))
		.filter(is_current.eq(true))
		.first(conn)
		.optional()?;
	Ok(rank)
}

/// All current rank rows for a player across queues.
pub fn current_for_player(conn: &mut DbConn, player_puuid: &str) -> Result<Vec<PlayerRank>> {
	let ranks = player_ranks
		.filter(puuid.eq(player_puuid))
		.filter(is_current.eq(true))
		.select(PlayerRank::as_select())
		.load(conn)?;
	Ok(ranks)
}

/// Full snapshot history for a player in one queue, oldest first.
pub fn history_for_queue(
	conn: &mut DbConn,
	player_puuid: &str,
	queue: &str,
) -> Result<Vec<PlayerRank>> {
	let ranks = player_ranks
		.filter(puuid.eq(player_puuid))
		.filter(queue_type.eq(queue))
		.order(fetched_at.asc())
		.select(PlayerRank::as_select())
		.load(conn)?;
	Ok(ranks)
}
