//! Database-first entry point for every read the jobs perform.
//!
//! Each `ensure_*` checks the tracker and the target table, goes external
//! only when the record is stale and the rate limiter admits a call within a
//! short wait, and writes back inside a single transaction per entity. On a
//! rate-limited or exhausted-transient refresh the cached row is served with
//! a warning tag; callers never see those conditions as errors.

pub mod freshness;
pub mod single_flight;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use diesel::Connection;
use tracing::{debug, warn};

pub use freshness::{Freshness, FreshnessPolicy};
pub use single_flight::SingleFlight;

use crate::db::{self, DbPool, PooledConn};
use crate::domain::error::{ErrorKind, Result};
use crate::domain::matches::{Match, MatchId};
use crate::domain::participant::NewMatchParticipant;
use crate::domain::player::{NewPlayer, Player, UpdatePlayer};
use crate::domain::rank::{NewPlayerRank, PlayerRank};
use crate::domain::tracking::DataKind;
use crate::riot::client::MatchIdsFilter;
use crate::riot::dto::{CurrentGameDto, MatchDto};
use crate::riot::routing::{MethodFamily, Platform};
use crate::riot::{ApiOutcome, RiotClient};

/// An ensured entity together with its freshness tag. `Absent` carries the
/// upstream 404 tombstone; it is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Ensured<T> {
    Fresh(T),
    Stale(T),
    Absent,
    MissingRateLimited { retry_after: Option<Duration> },
}

impl<T> Ensured<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Ensured::Fresh(value) | Ensured::Stale(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Ensured::Fresh(value) | Ensured::Stale(value) => Some(value),
            _ => None,
        }
    }

    pub fn freshness(&self) -> Option<Freshness> {
        match self {
            Ensured::Fresh(_) => Some(Freshness::Fresh),
            Ensured::Stale(_) => Some(Freshness::StaleServed),
            Ensured::MissingRateLimited { .. } => Some(Freshness::MissingRateLimited),
            Ensured::Absent => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Ensured::Stale(_))
    }

    pub fn is_missing_rate_limited(&self) -> bool {
        matches!(self, Ensured::MissingRateLimited { .. })
    }
}

pub struct DataManager {
    pool: DbPool,
    client: Arc<RiotClient>,
    policy: FreshnessPolicy,
    flights: SingleFlight,
    admission_wait: Duration,
}

impl DataManager {
    pub fn new(
        pool: DbPool,
        client: Arc<RiotClient>,
        policy: FreshnessPolicy,
        admission_wait: Duration,
    ) -> Self {
        Self {
            pool,
            client,
            policy,
            flights: SingleFlight::new(),
            admission_wait,
        }
    }

    fn conn(&self) -> Result<PooledConn> {
        Ok(self.pool.get()?)
    }

    /// Whether the tracker row for `(kind, ident)` is inside its TTL.
    fn is_fresh(&self, conn: &mut PooledConn, kind: DataKind, ident: &str) -> Result<bool> {
        let Some(ttl) = self.policy.ttl(kind) else {
            // Infinite TTL: fresh as soon as any fetch has happened.
            return Ok(db::data_tracking::find(conn, kind, ident)?
                .map(|t| t.last_fetched.is_some())
                .unwrap_or(false));
        };
        Ok(db::data_tracking::find(conn, kind, ident)?
            .map(|t| t.is_fresh(ttl, Utc::now()))
            .unwrap_or(false))
    }

    fn tombstoned(&self, conn: &mut PooledConn, kind: DataKind, ident: &str) -> Result<bool> {
        Ok(db::data_tracking::find(conn, kind, ident)?
            .map(|t| t.not_found)
            .unwrap_or(false))
    }

    /// Whether an external call for the key would have to wait longer than
    /// the configured short admission window.
    fn admission_blocked(&self, host: &str, family: MethodFamily) -> bool {
        let wait = self.client.limiter().current_wait(host, family);
        if wait > self.admission_wait {
            debug!(
                "admission blocked for {family}: wait {}ms exceeds {}ms",
                wait.as_millis(),
                self.admission_wait.as_millis()
            );
            true
        } else {
            false
        }
    }

    fn degraded<T>(cached: Option<T>, retry_after: Option<Duration>) -> Ensured<T> {
        match cached {
            Some(value) => {
                warn!("serving stale record, external refresh unavailable");
                Ensured::Stale(value)
            }
            None => Ensured::MissingRateLimited { retry_after },
        }
    }

    /// Ensures a player row for a human-visible riot id. Creates the player
    /// on first sighting.
    pub async fn ensure_player_by_riot_id(
        &self,
        platform: Platform,
        game_name: &str,
        tag_line: &str,
    ) -> Result<Ensured<Player>> {
        let ident = format!("{}#{}", game_name, tag_line).to_lowercase();
        let gate = self.flights.gate(DataKind::Account, &ident);
        let _flight = gate.lock().await;

        let cached = {
            let mut conn = self.conn()?;
            db::data_tracking::record_hit(&mut conn, DataKind::Account, &ident)?;
            let cached = db::players::find_by_riot_id(&mut conn, game_name, tag_line)?;
            if self.is_fresh(&mut conn, DataKind::Account, &ident)? {
                if let Some(player) = cached {
                    return Ok(Ensured::Fresh(player));
                }
                if self.tombstoned(&mut conn, DataKind::Account, &ident)? {
                    return Ok(Ensured::Absent);
                }
                None
            } else {
                cached
            }
        };

        let region = platform.region();
        let host = self.client.regional_host(region);
        if self.admission_blocked(&host, MethodFamily::AccountByRiotId) {
            return Ok(Self::degraded(cached, None));
        }

        match self
            .client
            .account_by_riot_id(region, game_name, tag_line)
            .await?
        {
            ApiOutcome::Found(dto) => {
                let mut conn = self.conn()?;
                let player = conn.transaction(|conn| {
                    let player = db::players::upsert(
                        conn,
                        NewPlayer {
                            puuid: dto.puuid,
                            game_name: dto.game_name,
                            tag_line: dto.tag_line,
                            platform: platform.to_string(),
                            summoner_id: None,
                            summoner_level: 0,
                            is_tracked: false,
                        },
                    )?;
                    db::data_tracking::record_fetch(conn, DataKind::Account, &ident)?;
                    Ok::<_, crate::Error>(player)
                })?;
                Ok(Ensured::Fresh(player))
            }
            ApiOutcome::NotFound => {
                let mut conn = self.conn()?;
                db::data_tracking::record_not_found(&mut conn, DataKind::Account, &ident)?;
                Ok(Ensured::Absent)
            }
            ApiOutcome::RateLimited { retry_after } => Ok(Self::degraded(cached, retry_after)),
            ApiOutcome::Transient { status } => {
                warn!("account lookup degraded after transient failures ({status:?})");
                Ok(Self::degraded(cached, None))
            }
            ApiOutcome::Fatal { status, message } => Err((
                ErrorKind::ExternalFatal,
                "account lookup failed",
                format!("status {status}: {message}"),
            )
                .into()),
        }
    }

    /// Refreshes a player's account identity by PUUID, creating the row on
    /// first sighting.
    pub async fn ensure_player_by_puuid(
        &self,
        platform: Platform,
        puuid: &str,
    ) -> Result<Ensured<Player>> {
        let gate = self.flights.gate(DataKind::Account, puuid);
        let _flight = gate.lock().await;

        let cached = {
            let mut conn = self.conn()?;
            db::data_tracking::record_hit(&mut conn, DataKind::Account, puuid)?;
            let cached = db::players::find_by_puuid(&mut conn, puuid)?;
            if self.is_fresh(&mut conn, DataKind::Account, puuid)? {
                if let Some(player) = cached {
                    return Ok(Ensured::Fresh(player));
                }
                if self.tombstoned(&mut conn, DataKind::Account, puuid)? {
                    return Ok(Ensured::Absent);
                }
                None
            } else {
                cached
            }
        };

        let region = platform.region();
        let host = self.client.regional_host(region);
        if self.admission_blocked(&host, MethodFamily::AccountByPuuid) {
            return Ok(Self::degraded(cached, None));
        }

        match self.client.account_by_puuid(region, puuid).await? {
            ApiOutcome::Found(dto) => {
                let mut conn = self.conn()?;
                let player = conn.transaction(|conn| {
                    let player = db::players::upsert(
                        conn,
                        NewPlayer {
                            puuid: dto.puuid,
                            game_name: dto.game_name,
                            tag_line: dto.tag_line,
                            platform: platform.to_string(),
                            summoner_id: None,
                            summoner_level: 0,
                            is_tracked: false,
                        },
                    )?;
                    db::data_tracking::record_fetch(conn, DataKind::Account, puuid)?;
                    Ok::<_, crate::Error>(player)
                })?;
                Ok(Ensured::Fresh(player))
            }
            ApiOutcome::NotFound => {
                let mut conn = self.conn()?;
                db::data_tracking::record_not_found(&mut conn, DataKind::Account, puuid)?;
                Ok(Ensured::Absent)
            }
            ApiOutcome::RateLimited { retry_after } => Ok(Self::degraded(cached, retry_after)),
            ApiOutcome::Transient { status } => {
                warn!("account refresh degraded after transient failures ({status:?})");
                Ok(Self::degraded(cached, None))
            }
            ApiOutcome::Fatal { status, message } => Err((
                ErrorKind::ExternalFatal,
                "account refresh failed",
                format!("status {status}: {message}"),
            )
                .into()),
        }
    }

    /// Ensures the summoner-scoped fields (account level, summoner id) of an
    /// existing player row.
    pub async fn ensure_summoner(
        &self,
        platform: Platform,
        puuid: &str,
    ) -> Result<Ensured<Player>> {
        let gate = self.flights.gate(DataKind::Summoner, puuid);
        let _flight = gate.lock().await;

        let cached = {
            let mut conn = self.conn()?;
            db::data_tracking::record_hit(&mut conn, DataKind::Summoner, puuid)?;
            let cached = db::players::find_by_puuid(&mut conn, puuid)?;
            if self.is_fresh(&mut conn, DataKind::Summoner, puuid)? {
                if let Some(player) = cached {
                    return Ok(Ensured::Fresh(player));
                }
                if self.tombstoned(&mut conn, DataKind::Summoner, puuid)? {
                    return Ok(Ensured::Absent);
                }
                None
            } else {
                cached
            }
        };

        let host = self.client.platform_host(platform);
        if self.admission_blocked(&host, MethodFamily::SummonerByPuuid) {
            return Ok(Self::degraded(cached, None));
        }

        match self.client.summoner_by_puuid(platform, puuid).await? {
            ApiOutcome::Found(dto) => {
                let mut conn = self.conn()?;
                let player = conn.transaction(|conn| {
                    let player = db::players::update(
                        conn,
                        &UpdatePlayer {
                            puuid: puuid.to_string(),
                            summoner_id: dto.id.clone(),
                            summoner_level: Some(dto.summoner_level as i32),
                            last_seen: Some(Utc::now()),
                            updated_at: Some(Utc::now()),
                            ..UpdatePlayer::default()
                        },
                    )?;
                    db::data_tracking::record_fetch(conn, DataKind::Summoner, puuid)?;
                    Ok::<_, crate::Error>(player)
                })?;
                Ok(Ensured::Fresh(player))
            }
            ApiOutcome::NotFound => {
                let mut conn = self.conn()?;
                db::data_tracking::record_not_found(&mut conn, DataKind::Summoner, puuid)?;
                Ok(Ensured::Absent)
            }
            ApiOutcome::RateLimited { retry_after } => Ok(Self::degraded(cached, retry_after)),
            ApiOutcome::Transient { status } => {
                warn!("summoner refresh degraded after transient failures ({status:?})");
                Ok(Self::degraded(cached, None))
            }
            ApiOutcome::Fatal { status, message } => Err((
                ErrorKind::ExternalFatal,
                "summoner refresh failed",
                format!("status {status}: {message}"),
            )
                .into()),
        }
    }

    /// Ensures current rank rows for a player across ranked queues.
    pub async fn ensure_ranks(
        &self,
        platform: Platform,
        puuid: &str,
    ) -> Result<Ensured<Vec<PlayerRank>>> {
        let gate = self.flights.gate(DataKind::Rank, puuid);
        let _flight = gate.lock().await;

        let cached = {
            let mut conn = self.conn()?;
            db::data_tracking::record_hit(&mut conn, DataKind::Rank, puuid)?;
            let cached = db::ranks::current_for_player(&mut conn, puuid)?;
            if self.is_fresh(&mut conn, DataKind::Rank, puuid)? {
                return Ok(Ensured::Fresh(cached));
            }
            cached
        };
        let cached = if cached.is_empty() { None } else { Some(cached) };

        // League entries key on the summoner id; ensure it first.
        let summoner_id = {
            let mut conn = self.conn()?;
            db::players::find_by_puuid(&mut conn, puuid)?.and_then(|p| p.summoner_id)
        };
        let summoner_id = match summoner_id {
            Some(id) => id,
            None => match self.ensure_summoner(platform, puuid).await? {
                Ensured::Fresh(player) | Ensured::Stale(player) => match player.summoner_id {
                    Some(id) => id,
                    None => return Ok(Self::degraded(cached, None)),
                },
                Ensured::Absent => return Ok(Ensured::Absent),
                Ensured::MissingRateLimited { retry_after } => {
                    return Ok(Self::degraded(cached, retry_after));
                }
            },
        };

        let host = self.client.platform_host(platform);
        if self.admission_blocked(&host, MethodFamily::LeagueEntries) {
            return Ok(Self::degraded(cached, None));
        }

        match self
            .client
            .league_entries_by_summoner(platform, &summoner_id)
            .await?
        {
            ApiOutcome::Found(entries) => {
                let mut conn = self.conn()?;
                let ranks = conn.transaction(|conn| {
                    let now = Utc::now();
                    let mut stored = Vec::with_capacity(entries.len());
                    for entry in &entries {
                        stored.push(db::ranks::upsert_current(
                            conn,
                            NewPlayerRank {
                                puuid: puuid.to_string(),
                                queue_type: entry.queue_type.clone(),
                                tier: entry.tier.clone(),
                                division: entry.rank.clone().unwrap_or_else(|| "I".to_string()),
                                league_points: entry.league_points,
                                wins: entry.wins,
                                losses: entry.losses,
                                hot_streak: entry.hot_streak,
                                is_current: true,
                                fetched_at: now,
                            },
                        )?);
                    }
                    db::data_tracking::record_fetch(conn, DataKind::Rank, puuid)?;
                    Ok::<_, crate::Error>(stored)
                })?;
                Ok(Ensured::Fresh(ranks))
            }
            // An unranked player has no entries; the provider answers 404 on
            // some shards and an empty list on others.
            ApiOutcome::NotFound => {
                let mut conn = self.conn()?;
                db::data_tracking::record_fetch(&mut conn, DataKind::Rank, puuid)?;
                Ok(Ensured::Fresh(Vec::new()))
            }
            ApiOutcome::RateLimited { retry_after } => Ok(Self::degraded(cached, retry_after)),
            ApiOutcome::Transient { status } => {
                warn!("rank refresh degraded after transient failures ({status:?})");
                Ok(Self::degraded(cached, None))
            }
            ApiOutcome::Fatal { status, message } => Err((
                ErrorKind::ExternalFatal,
                "rank refresh failed",
                format!("status {status}: {message}"),
            )
                .into()),
        }
    }

    /// Ensures the list of the player's most recent match ids, newest first.
    /// The cached answer is the set of already-ingested matches.
    pub async fn ensure_match_ids(
        &self,
        platform: Platform,
        puuid: &str,
        count: u32,
        queue: Option<i32>,
    ) -> Result<Ensured<Vec<MatchId>>> {
        let gate = self.flights.gate(DataKind::MatchIds, puuid);
        let _flight = gate.lock().await;

        let cached = {
            let mut conn = self.conn()?;
            db::data_tracking::record_hit(&mut conn, DataKind::MatchIds, puuid)?;
            let cached = db::matches::recent_ids_for_player(&mut conn, puuid, i64::from(count))?;
            if self.is_fresh(&mut conn, DataKind::MatchIds, puuid)? {
                return Ok(Ensured::Fresh(cached));
            }
            cached
        };
        let cached = if cached.is_empty() { None } else { Some(cached) };

        let region = platform.region();
        let host = self.client.regional_host(region);
        if self.admission_blocked(&host, MethodFamily::MatchIdsByPuuid) {
            return Ok(Self::degraded(cached, None));
        }

        let filter = MatchIdsFilter {
            count: Some(count),
            queue,
            ..MatchIdsFilter::default()
        };
        match self.client.match_ids_by_puuid(region, puuid, &filter).await? {
            ApiOutcome::Found(ids) => {
                let mut conn = self.conn()?;
                db::data_tracking::record_fetch(&mut conn, DataKind::MatchIds, puuid)?;
                Ok(Ensured::Fresh(ids))
            }
            ApiOutcome::NotFound => {
                let mut conn = self.conn()?;
                db::data_tracking::record_not_found(&mut conn, DataKind::MatchIds, puuid)?;
                Ok(Ensured::Absent)
            }
            ApiOutcome::RateLimited { retry_after } => Ok(Self::degraded(cached, retry_after)),
            ApiOutcome::Transient { status } => {
                warn!("match-id listing degraded after transient failures ({status:?})");
                Ok(Self::degraded(cached, None))
            }
            ApiOutcome::Fatal { status, message } => Err((
                ErrorKind::ExternalFatal,
                "match-id listing failed",
                format!("status {status}: {message}"),
            )
                .into()),
        }
    }

    /// Ensures a match together with its participant batch. Completed
    /// matches are immutable, so a stored match is always fresh; ensuring it
    /// twice touches nothing but the hit counter.
    pub async fn ensure_match_with_participants(
        &self,
        platform: Platform,
        match_id: &str,
    ) -> Result<Ensured<Match>> {
        let gate = self.flights.gate(DataKind::Match, match_id);
        let _flight = gate.lock().await;

        {
            let mut conn = self.conn()?;
            db::data_tracking::record_hit(&mut conn, DataKind::Match, match_id)?;
            if let Some(stored) = db::matches::find_by_id(&mut conn, match_id)? {
                return Ok(Ensured::Fresh(stored));
            }
            if self.tombstoned(&mut conn, DataKind::Match, match_id)? {
                return Ok(Ensured::Absent);
            }
        }

        let region = platform.region();
        let host = self.client.regional_host(region);
        if self.admission_blocked(&host, MethodFamily::MatchById) {
            return Ok(Ensured::MissingRateLimited { retry_after: None });
        }

        match self.client.match_by_id(region, match_id).await? {
            ApiOutcome::Found(dto) => {
                let stored = self.ingest_match(dto)?;
                Ok(Ensured::Fresh(stored))
            }
            ApiOutcome::NotFound => {
                let mut conn = self.conn()?;
                db::data_tracking::record_not_found(&mut conn, DataKind::Match, match_id)?;
                Ok(Ensured::Absent)
            }
            ApiOutcome::RateLimited { retry_after } => {
                Ok(Ensured::MissingRateLimited { retry_after })
            }
            ApiOutcome::Transient { status } => {
                warn!("match fetch degraded after transient failures ({status:?})");
                Ok(Ensured::MissingRateLimited { retry_after: None })
            }
            ApiOutcome::Fatal { status, message } => Err((
                ErrorKind::ExternalFatal,
                "match fetch failed",
                format!("status {status}: {message}"),
            )
                .into()),
        }
    }

    /// Uncached account probe for the ban heuristic. Deliberately bypasses
    /// the freshness path: the caller needs to know whether the account is
    /// resolvable right now, and a transient failure must stay
    /// distinguishable from a 404.
    pub async fn probe_account(
        &self,
        platform: Platform,
        puuid: &str,
    ) -> Result<ApiOutcome<crate::riot::dto::AccountDto>> {
        self.client.account_by_puuid(platform.region(), puuid).await
    }

    /// Live game lookup. Inherently live, never cached; the outcome is
    /// passed through as-is.
    pub async fn active_game(
        &self,
        platform: Platform,
        puuid: &str,
    ) -> Result<ApiOutcome<CurrentGameDto>> {
        self.client.active_game_by_puuid(platform, puuid).await
    }

    /// Writes a fetched match, its participants and minimal rows for unseen
    /// players in one transaction. Participant identity between
    /// `metadata.participants` and `info.participants` is by index; a
    /// mismatch means a malformed payload and fails the ensure.
    fn ingest_match(&self, dto: MatchDto) -> Result<Match> {
        if dto.metadata.participants.len() != dto.info.participants.len() {
            return Err((
                ErrorKind::ExternalFatal,
                "match payload participant lists disagree",
                format!(
                    "metadata {} vs info {}",
                    dto.metadata.participants.len(),
                    dto.info.participants.len()
                ),
            )
                .into());
        }
        if !(2..=10).contains(&dto.info.participants.len()) {
            return Err((
                ErrorKind::ExternalFatal,
                "match payload has an impossible participant count",
                dto.info.participants.len().to_string(),
            )
                .into());
        }

        let platform_code = dto.info.platform_id.to_lowercase();
        let new_match = crate::domain::matches::NewMatch {
            match_id: dto.metadata.match_id.clone(),
            platform: platform_code.clone(),
            queue_id: dto.info.queue_id,
            game_mode: dto.info.game_mode.clone(),
            game_creation: dto.info.game_creation_utc(),
            game_duration_secs: dto.info.game_duration as i32,
            game_version: dto.info.game_version.clone(),
            is_processed: true,
        };

        // Identity is by index against metadata.participants; the metadata
        // list is authoritative for the rows the participants reference.
        let seen_players: Vec<NewPlayer> = dto
            .metadata
            .participants
            .iter()
            .map(|meta_puuid| NewPlayer {
                puuid: meta_puuid.clone(),
                game_name: String::new(),
                tag_line: String::new(),
                platform: platform_code.clone(),
                summoner_id: None,
                summoner_level: 0,
                is_tracked: false,
            })
            .collect();

        let participants: Vec<NewMatchParticipant> = dto
            .metadata
            .participants
            .iter()
            .zip(dto.info.participants.iter())
            .map(|(meta_puuid, p)| NewMatchParticipant {
                match_id: dto.metadata.match_id.clone(),
                puuid: meta_puuid.clone(),
                champion_id: p.champion_id,
                champion_name: p.champion_name.clone(),
                team_id: p.team_id,
                win: p.win,
                kills: p.kills,
                deaths: p.deaths,
                assists: p.assists,
                cs: p.creep_score(),
                gold_earned: p.gold_earned,
                damage_to_champions: p.total_damage_dealt_to_champions,
                vision_score: p.vision_score,
                position: p.team_position.clone(),
            })
            .collect();

        let match_id = dto.metadata.match_id;
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            db::players::insert_missing(conn, &seen_players)?;
            let stored = db::matches::insert_with_participants(conn, new_match, participants)?;
            db::data_tracking::record_fetch(conn, DataKind::Match, &match_id)?;
            Ok::<_, crate::Error>(stored)
        })
    }
}
