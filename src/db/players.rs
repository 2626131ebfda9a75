//! Database access layer for player entities.
//!
//! Players are created by the data manager on first sighting and mutated by
//! the updater, analyzer and ban-checker jobs. Rows are never deleted; bans
//! and vanished accounts flip `is_active` instead.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Timestamptz};

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::player::{NewPlayer, Player, UpdatePlayer};
use crate::schema::players::dsl::*;

/// Attempts to find a player by their PUUID.
pub fn find_by_puuid(conn: &mut DbConn, player_puuid: &str) -> Result<Option<Player>> {
	let player: Option<Player> = players.find(player_puuid).first(conn).optional()?;
	Ok(player)
}

/// Retrieves a player by their PUUID, erroring when absent.
pub fn get_by_puuid(conn: &mut DbConn, player_puuid: &str) -> Result<Player> {
	let player = players.find(player_puuid).first(conn)?;
	Ok(player)
}

/// Attempts to find a player by their riot id (`name#tag`), case-insensitive.
pub fn find_by_riot_id(conn: &mut DbConn, name: &str, tag: &str) -> Result<Option<Player>> {
	let player: Option<Player> = players
		.filter(game_name.ilike(name))
		.filter(tag_line.ilike(tag))
		.first(conn)
		.optional()?;
	Ok(player)
}

/// Inserts a player or refreshes the identity fields of an existing row.
/// Summoner-scoped fields (level, summoner id) are left alone; the summoner
/// ensure owns those.
pub fn upsert(conn: &mut DbConn, entity: NewPlayer) -> Result<Player> {
	let player = diesel::insert_into(players)
		.values(&entity)
		.on_conflict(puuid)
		.do_update()
		.set((
			game_name.eq(&entity.game_name),
			tag_line.eq(&entity.tag_line),
			updated_at.eq(Utc::now()),
		))
		.returning(Player::as_returning())
		.get_result(conn)?;
	Ok(player)
}

/// Applies a changeset to an existing player.
pub fn update(conn: &mut DbConn, changeset: &UpdatePlayer) -> Result<Player> {
	let player = diesel::update(players.find(&changeset.puuid))
		.set(changeset)
		.returning(Player::as_returning())
		.get_result(conn)?;
	Ok(player)
}

/// Lists tracked players, oldest data first, capped for one run.
pub fn list_tracked(conn: &mut DbConn, cap: i64) -> Result<Vec<Player>> {
	let tracked = players
		.filter(is_tracked.eq(true))
		.filter(is_active.eq(true))
		.order(updated_at.asc())
		.limit(cap)
		.select(Player::as_select())
		.load(conn)?;
	Ok(tracked)
}

/// Flags or unflags a player for tracking.
pub fn set_tracked(conn: &mut DbConn, player_puuid: &str, tracked: bool) -> Result<usize> {
	let updated = diesel::update(players.find(player_puuid))
		.set((is_tracked.eq(tracked), updated_at.eq(Utc::now())))
		.execute(conn)?;
	Ok(updated)
}

/// Records that an analysis was stored for this player.
pub fn mark_analyzed(conn: &mut DbConn, player_puuid: &str) -> Result<usize> {
	let updated = diesel::update(players.find(player_puuid))
		.set((is_analyzed.eq(true), updated_at.eq(Utc::now())))
		.execute(conn)?;
	Ok(updated)
}

/// Advances the ban-check watermark, optionally deactivating the account.
pub fn record_ban_check(
	conn: &mut DbConn,
	player_puuid: &str,
	checked_at: DateTime<Utc>,
	banned: bool,
) -> Result<usize> {
	let updated = diesel::update(players.find(player_puuid))
		.set((
			last_ban_check.eq(Some(checked_at)),
			is_active.eq(!banned),
			updated_at.eq(Utc::now()),
		))
		.execute(conn)?;
	Ok(updated)
}

/// Working set for the match fetcher: active, untracked players seen in
/// ingested matches that still hold fewer than `target` stored matches.
pub fn list_undersampled(conn: &mut DbConn, target: i64, cap: i64) -> Result<Vec<Player>> {
	let candidates = sql_query(
		"SELECT p.* FROM players p \
		 JOIN match_participants mp ON mp.puuid = p.puuid \
		 WHERE p.is_tracked = FALSE AND p.is_active = TRUE \
		 GROUP BY p.puuid \
		 HAVING COUNT(mp.id) < $1 \
		 ORDER BY COUNT(mp.id) ASC, p.puuid \
		 LIMIT $2",
	)
	.bind::<BigInt, _>(target)
	.bind::<BigInt, _>(cap)
	.load(conn)?;
	Ok(candidates)
}

/// Working set for the analyzer: players holding at least `min_games` stored
/// matches whose latest analysis is absent or older than `analyzed_before`.
pub fn list_analysis_candidates(
	conn: &mut DbConn,
	min_games: i64,
	analyzed_before: DateTime<Utc>,
	cap: i64,
) -> Result<Vec<Player>> {
	let candidates = sql_query(
		"SELECT p.* FROM players p \
		 WHERE p.is_active = TRUE \
		 AND (SELECT COUNT(*) FROM match_participants mp WHERE mp.puuid = p.puuid) >= $1 \
		 AND NOT EXISTS ( \
		     SELECT 1 FROM smurf_detections sd \
		     WHERE sd.puuid = p.puuid AND sd.created_at > $2 \
		 ) \
		 ORDER BY p.updated_at ASC \
		 LIMIT $3",
	)
	.bind::<BigInt, _>(min_games)
	.bind::<Timestamptz, _>(analyzed_before)
	.bind::<BigInt, _>(cap)
	.load(conn)?;
	Ok(candidates)
}

/// Working set for the ban checker: players flagged by a recent
/// high-confidence detection whose ban-check watermark is stale.
pub fn list_ban_check_candidates(
	conn: &mut DbConn,
	flagged_since: DateTime<Utc>,
	checked_before: DateTime<Utc>,
	cap: i64,
) -> Result<Vec<Player>> {
	let candidates = sql_query(
		"SELECT p.* FROM players p \
		 WHERE p.is_active = TRUE \
		 AND (p.last_ban_check IS NULL OR p.last_ban_check < $1) \
		 AND EXISTS ( \
		     SELECT 1 FROM smurf_detections sd \
		     WHERE sd.puuid = p.puuid \
		       AND sd.created_at > $2 \
		       AND sd.confidence = 'high' \
		 ) \
		 ORDER BY p.last_ban_check ASC NULLS FIRST \
		 LIMIT $3",
	)
	.bind::<Timestamptz, _>(checked_before)
	.bind::<Timestamptz, _>(flagged_since)
	.bind::<BigInt, _>(cap)
	.load(conn)?;
	Ok(candidates)
}

/// Inserts minimal rows for players first seen as match participants.
/// Existing rows are left untouched.
pub fn insert_missing(conn: &mut DbConn, entities: &[NewPlayer]) -> Result<usize> {
	let inserted = diesel::insert_into(players)
		.values(entities)
		.on_conflict(puuid)
		.do_nothing()
		.execute(conn)?;
	Ok(inserted)
}

/// Checks whether a player with the given PUUID exists.
pub fn exists(conn: &mut DbConn, player_puuid: &str) -> Result<bool> {
	let player = find_by_puuid(conn, player_puuid)?;
	Ok(player.is_some())
}
