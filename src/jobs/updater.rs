//! Tracked-player updater: keeps watched players current.
//!
//! Working set: players with `is_tracked = true`, oldest data first, capped
//! per run. For each player the job ensures account identity, summoner
//! fields, current ranks and the most recent match ids, then ingests every
//! id not yet stored. All reads go through the data manager; a missing
//! rate-limited answer yields the whole execution as `rate_limited`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::data::{DataManager, Ensured};
use crate::db;
use crate::domain::error::{ErrorKind, Result};
use crate::domain::jobs::{JobKind, RunSummary};
use crate::domain::player::Player;
use crate::jobs::{Job, RunContext, yield_if_rate_limited};
use crate::riot::routing::Platform;

pub struct TrackedPlayerUpdater {
    data: Arc<DataManager>,
}

impl TrackedPlayerUpdater {
    pub fn new(data: Arc<DataManager>) -> Self {
        Self { data }
    }

    async fn update_player(
        &self,
        ctx: &RunContext,
        summary: &mut RunSummary,
        platform: Platform,
        player: &Player,
    ) -> Result<()> {
        let account = self
            .data
            .ensure_player_by_puuid(platform, &player.puuid)
            .await?;
        yield_if_rate_limited(&account)?;
        if account.is_stale() {
            summary.stale_served += 1;
        }
        if matches!(account, Ensured::Absent) {
            ctx.log
                .warn(format!("tracked player {} is gone upstream", player.puuid));
            return Ok(());
        }

        let summoner = self.data.ensure_summoner(platform, &player.puuid).await?;
        yield_if_rate_limited(&summoner)?;
        if summoner.is_stale() {
            summary.stale_served += 1;
        }

        let ranks = self.data.ensure_ranks(platform, &player.puuid).await?;
        yield_if_rate_limited(&ranks)?;
        if ranks.is_stale() {
            summary.stale_served += 1;
        }

        let cap = ctx.tunables.max_new_matches_per_player.max(0) as u32;
        let ids = self
            .data
            .ensure_match_ids(platform, &player.puuid, cap, None)
            .await?;
        yield_if_rate_limited(&ids)?;
        if ids.is_stale() {
            summary.stale_served += 1;
        }
        let ids = ids.into_value().unwrap_or_default();

        let missing = {
            let mut conn = ctx.pool.get()?;
            db::matches::missing_ids(&mut conn, &ids)?
        };
        for match_id in missing.iter().take(cap as usize) {
            ctx.check_cancelled()?;
            let ensured = self
                .data
                .ensure_match_with_participants(platform, match_id)
                .await?;
            yield_if_rate_limited(&ensured)?;
            if ensured.value().is_some() {
                summary.matches_ingested += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Job for TrackedPlayerUpdater {
    fn kind(&self) -> JobKind {
        JobKind::TrackedPlayerUpdater
    }

    fn name(&self) -> &str {
        "Tracked player updater"
    }

    async fn execute(&self, ctx: Arc<RunContext>) -> Result<RunSummary> {
        let cap = ctx.tunables.max_tracked_players_per_run.max(0);
        let players = {
            let mut conn = ctx.pool.get()?;
            db::players::list_tracked(&mut conn, cap)?
        };

        let mut summary = RunSummary {
            cap_reached: players.len() as i64 >= cap && cap > 0,
            ..RunSummary::default()
        };
        ctx.log
            .info(format!("updating {} tracked players", players.len()));

        for player in &players {
            ctx.check_cancelled()?;
            summary.players_processed += 1;

            let Ok(platform) = player.platform.parse::<Platform>() else {
                ctx.log.warn(format!(
                    "player {} carries unknown platform {:?}",
                    player.puuid, player.platform
                ));
                summary.players_failed += 1;
                continue;
            };

            match self
                .update_player(&ctx, &mut summary, platform, player)
                .await
            {
                Ok(()) => summary.players_updated += 1,
                Err(err) if err.kind() == ErrorKind::RateLimited => {
                    ctx.log.warn(format!(
                        "updater yielding after {} of {} players: {}",
                        summary.players_processed,
                        players.len(),
                        err.ledger_message()
                    ));
                    summary.rate_limited = true;
                    return Ok(summary);
                }
                Err(err) if matches!(err.kind(), ErrorKind::Cancelled | ErrorKind::Timeout) => {
                    return Err(err);
                }
                Err(err) => {
                    summary.players_failed += 1;
                    ctx.log.error(format!(
                        "update failed for {}: {}",
                        player.puuid,
                        err.ledger_message()
                    ));
                }
            }
        }

        ctx.log.info(format!(
            "updater done: {} processed, {} updated, {} matches ingested, {} failed",
            summary.players_processed,
            summary.players_updated,
            summary.matches_ingested,
            summary.players_failed
        ));
        Ok(summary)
    }
}
