//! Player analyzer: scores accumulated data.
//!
//! Working set: players holding at least the minimum stored matches whose
//! latest analysis is absent or older than the reanalysis threshold. A pure
//! read over persistence; the job makes no external API calls. The scoring
//! engine is constructed per run so a broken weight table fails the
//! execution with a config marker before any factor function is invoked.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use diesel::Connection;

use crate::configuration::ScoringSettings;
use crate::db::{self, DbPool};
use crate::domain::detection::NewSmurfDetection;
use crate::domain::error::Result;
use crate::domain::jobs::{JobKind, RunSummary};
use crate::domain::matches::RANKED_SOLO_QUEUE;
use crate::domain::rank::RANKED_SOLO;
use crate::jobs::{Job, RunContext};
use crate::scoring::{AnalysisInput, ScoringEngine};

pub struct PlayerAnalyzer {
    pool: DbPool,
    settings: ScoringSettings,
}

impl PlayerAnalyzer {
    pub fn new(pool: DbPool, settings: ScoringSettings) -> Self {
        Self { pool, settings }
    }
}

#[async_trait]
impl Job for PlayerAnalyzer {
    fn kind(&self) -> JobKind {
        JobKind::PlayerAnalyzer
    }

    fn name(&self) -> &str {
        "Player analyzer"
    }

    async fn execute(&self, ctx: Arc<RunContext>) -> Result<RunSummary> {
        let engine = ScoringEngine::new(&self.settings)?;

        let cutoff = Utc::now() - Duration::hours(ctx.tunables.reanalysis_age.max(0));
        let cap = ctx.tunables.max_tracked_players_per_run.max(0);
        let candidates = {
            let mut conn = self.pool.get()?;
            db::players::list_analysis_candidates(
                &mut conn,
                ctx.tunables.minimum_games_for_analysis.max(0),
                cutoff,
                cap,
            )?
        };

        let mut summary = RunSummary {
            cap_reached: candidates.len() as i64 >= cap && cap > 0,
            ..RunSummary::default()
        };
        ctx.log
            .info(format!("analyzing {} players", candidates.len()));

        for player in &candidates {
            ctx.check_cancelled()?;
            summary.players_processed += 1;

            let result: Result<()> = (|| {
                let mut conn = self.pool.get()?;
                let window = db::participants::recent_for_player(
                    &mut conn,
                    &player.puuid,
                    engine.window() as i64,
                )?;
                let current_rank =
                    db::ranks::current_for_queue(&mut conn, &player.puuid, RANKED_SOLO)?;
                let rank_history =
                    db::ranks::history_for_queue(&mut conn, &player.puuid, RANKED_SOLO)?;

                let report = engine.score(&AnalysisInput {
                    player,
                    window: &window,
                    current_rank: current_rank.as_ref(),
                    rank_history: &rank_history,
                });

                conn.transaction(|conn| -> Result<()> {
                    db::detections::insert(
                        conn,
                        NewSmurfDetection {
                            puuid: player.puuid.clone(),
                            overall_score: report.overall,
                            factor_scores: report.factors_json(),
                            confidence: report.confidence,
                            games_analyzed: report.games_analyzed,
                            queue_id: Some(RANKED_SOLO_QUEUE),
                            analysis_version: engine.version().to_string(),
                        },
                    )?;
                    db::players::mark_analyzed(conn, &player.puuid)?;
                    Ok(())
                })?;

                ctx.log.info(format!(
                    "analyzed {}: score {:.3} ({:?}) over {} games",
                    player.puuid, report.overall, report.confidence, report.games_analyzed
                ));
                Ok(())
            })();

            match result {
                Ok(()) => {
                    summary.players_updated += 1;
                    summary.analyses_stored += 1;
                }
                Err(err) => {
                    summary.players_failed += 1;
                    ctx.log.error(format!(
                        "analysis failed for {}: {}",
                        player.puuid,
                        err.ledger_message()
                    ));
                }
            }
        }

        ctx.log.info(format!(
            "analyzer done: {} analyses stored, {} failed",
            summary.analyses_stored, summary.players_failed
        ));
        Ok(summary)
    }
}
