//! Ban checker: probes flagged accounts for disappearance.
//!
//! Working set: players carrying a recent high-confidence detection whose
//! ban-check watermark is older than the configured window.
//! The probe is a single uncached account lookup; an unresolvable account is
//! the (best effort) ban signal. The watermark advances only on a response
//! that is not transient, so an external outage cannot masquerade as a wave
//! of bans.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::data::DataManager;
use crate::db;
use crate::domain::error::Result;
use crate::domain::jobs::{JobKind, RunSummary};
use crate::jobs::{Job, RunContext};
use crate::riot::ApiOutcome;
use crate::riot::routing::Platform;

/// How far back a detection still flags a player for checking.
const FLAGGED_WINDOW_DAYS: i64 = 30;

pub struct BanChecker {
    data: Arc<DataManager>,
}

impl BanChecker {
    pub fn new(data: Arc<DataManager>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Job for BanChecker {
    fn kind(&self) -> JobKind {
        JobKind::BanChecker
    }

    fn name(&self) -> &str {
        "Ban checker"
    }

    async fn execute(&self, ctx: Arc<RunContext>) -> Result<RunSummary> {
        let now = Utc::now();
        let cap = ctx.tunables.max_tracked_players_per_run.max(0);
        let candidates = {
            let mut conn = ctx.pool.get()?;
            db::players::list_ban_check_candidates(
                &mut conn,
                now - Duration::days(FLAGGED_WINDOW_DAYS),
                now - Duration::days(ctx.tunables.ban_check_days.max(0)),
                cap,
            )?
        };

        let mut summary = RunSummary {
            cap_reached: candidates.len() as i64 >= cap && cap > 0,
            ..RunSummary::default()
        };
        ctx.log
            .info(format!("checking {} flagged players", candidates.len()));

        for player in &candidates {
            ctx.check_cancelled()?;
            summary.players_processed += 1;

            let Ok(platform) = player.platform.parse::<Platform>() else {
                summary.players_failed += 1;
                continue;
            };

            match self.data.probe_account(platform, &player.puuid).await? {
                ApiOutcome::Found(_) => {
                    let mut conn = ctx.pool.get()?;
                    db::players::record_ban_check(&mut conn, &player.puuid, Utc::now(), false)?;
                    summary.players_updated += 1;
                }
                ApiOutcome::NotFound => {
                    let mut conn = ctx.pool.get()?;
                    db::players::record_ban_check(&mut conn, &player.puuid, Utc::now(), true)?;
                    summary.players_updated += 1;
                    summary.bans_detected += 1;
                    ctx.log
                        .warn(format!("player {} no longer resolvable; marked banned", player.puuid));
                }
                ApiOutcome::RateLimited { .. } => {
                    ctx.log.warn("ban checker yielding to the rate limiter");
                    summary.rate_limited = true;
                    return Ok(summary);
                }
                // A transient failure leaves last_ban_check untouched; the
                // player stays in the working set for the next run.
                ApiOutcome::Transient { status } => {
                    summary.players_failed += 1;
                    ctx.log.warn(format!(
                        "ban probe for {} inconclusive ({status:?})",
                        player.puuid
                    ));
                }
                ApiOutcome::Fatal { status, message } => {
                    summary.players_failed += 1;
                    ctx.log.error(format!(
                        "ban probe for {} failed: status {status}: {message}",
                        player.puuid
                    ));
                }
            }
        }

        ctx.log.info(format!(
            "ban checker done: {} checked, {} bans detected",
            summary.players_processed, summary.bans_detected
        ));
        Ok(summary)
    }
}
