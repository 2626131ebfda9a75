//! Match fetcher: expands graph coverage.
//!
//! Working set: players discovered as teammates or opponents in ingested
//! matches that still hold fewer stored matches than the target. Players are
//! processed with a bounded fan-out (`per_job_concurrency`); within one
//! player the ensures stay sequential.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::data::DataManager;
use crate::db;
use crate::domain::error::{Error, ErrorKind, Result};
use crate::domain::jobs::{JobKind, RunSummary};
use crate::domain::player::Player;
use crate::jobs::{Job, RunContext, yield_if_rate_limited};
use crate::riot::routing::Platform;

pub struct MatchFetcher {
    data: Arc<DataManager>,
}

/// Per-player tally merged into the run summary as fan-out tasks finish.
#[derive(Default)]
struct PlayerTally {
    ingested: u32,
    stale: u32,
    failed: bool,
}

impl MatchFetcher {
    pub fn new(data: Arc<DataManager>) -> Self {
        Self { data }
    }

    async fn fetch_for_player(
        data: Arc<DataManager>,
        ctx: Arc<RunContext>,
        player: Player,
    ) -> Result<PlayerTally> {
        let mut tally = PlayerTally::default();
        ctx.check_cancelled()?;

        let Ok(platform) = player.platform.parse::<Platform>() else {
            ctx.log.warn(format!(
                "player {} carries unknown platform {:?}",
                player.puuid, player.platform
            ));
            tally.failed = true;
            return Ok(tally);
        };

        let stored = {
            let mut conn = ctx.pool.get()?;
            db::matches::count_for_player(&mut conn, &player.puuid)?
        };
        let wanted = (ctx.tunables.target_matches_per_player - stored)
            .clamp(0, ctx.tunables.matches_per_player_per_run);
        if wanted == 0 {
            return Ok(tally);
        }

        let ids = data
            .ensure_match_ids(platform, &player.puuid, wanted as u32, None)
            .await?;
        yield_if_rate_limited(&ids)?;
        if ids.is_stale() {
            tally.stale += 1;
        }
        let ids = ids.into_value().unwrap_or_default();

        let missing = {
            let mut conn = ctx.pool.get()?;
            db::matches::missing_ids(&mut conn, &ids)?
        };
        for match_id in missing.iter().take(wanted as usize) {
            ctx.check_cancelled()?;
            let ensured = data
                .ensure_match_with_participants(platform, match_id)
                .await?;
            yield_if_rate_limited(&ensured)?;
            if ensured.value().is_some() {
                tally.ingested += 1;
            }
        }
        Ok(tally)
    }
}

#[async_trait]
impl Job for MatchFetcher {
    fn kind(&self) -> JobKind {
        JobKind::MatchFetcher
    }

    fn name(&self) -> &str {
        "Match fetcher"
    }

    async fn execute(&self, ctx: Arc<RunContext>) -> Result<RunSummary> {
        let cap = ctx.tunables.max_tracked_players_per_run.max(0);
        let candidates = {
            let mut conn = ctx.pool.get()?;
            db::players::list_undersampled(
                &mut conn,
                ctx.tunables.target_matches_per_player,
                cap,
            )?
        };

        let mut summary = RunSummary {
            cap_reached: candidates.len() as i64 >= cap && cap > 0,
            ..RunSummary::default()
        };
        ctx.log.info(format!(
            "expanding coverage for {} undersampled players",
            candidates.len()
        ));

        let concurrency = ctx.tunables.per_job_concurrency.max(1);
        let mut pending = candidates.into_iter();
        let mut tasks: JoinSet<Result<PlayerTally>> = JoinSet::new();
        let mut yielded: Option<Error> = None;

        loop {
            while tasks.len() < concurrency && yielded.is_none() {
                let Some(player) = pending.next() else { break };
                tasks.spawn(Self::fetch_for_player(
                    Arc::clone(&self.data),
                    Arc::clone(&ctx),
                    player,
                ));
            }

            let Some(joined) = tasks.join_next().await else { break };
            summary.players_processed += 1;
            match joined {
                Ok(Ok(tally)) => {
                    summary.matches_ingested += tally.ingested;
                    summary.stale_served += tally.stale;
                    if tally.failed {
                        summary.players_failed += 1;
                    } else {
                        summary.players_updated += 1;
                    }
                }
                Ok(Err(err))
                    if matches!(
                        err.kind(),
                        ErrorKind::RateLimited | ErrorKind::Cancelled | ErrorKind::Timeout
                    ) =>
                {
                    // Stop feeding new players and drain what is in flight.
                    if yielded.is_none() {
                        ctx.log.warn(format!(
                            "fetcher yielding: {}",
                            err.ledger_message()
                        ));
                        ctx.cancel.cancel();
                        yielded = Some(err);
                    }
                }
                Ok(Err(err)) => {
                    summary.players_failed += 1;
                    ctx.log
                        .error(format!("fetch failed: {}", err.ledger_message()));
                }
                Err(join_err) => {
                    summary.players_failed += 1;
                    ctx.log.error(format!("fetch task panicked: {join_err}"));
                }
            }
        }

        if let Some(err) = yielded {
            if err.kind() == ErrorKind::RateLimited {
                summary.rate_limited = true;
                return Ok(summary);
            }
            return Err(err);
        }

        ctx.log.info(format!(
            "fetcher done: {} players, {} matches ingested, {} failed",
            summary.players_processed, summary.matches_ingested, summary.players_failed
        ));
        Ok(summary)
    }
}
