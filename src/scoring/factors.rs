//! The nine analyzer functions.
//!
//! Every factor is a pure function over pre-fetched rows returning a score
//! in [0, 1]. No IO happens here. Mathematical edge cases (empty window,
//! missing rank, too few games for a trend) clamp to 0 rather than erroring.

use crate::domain::matches::Match;
use crate::domain::participant::{MatchParticipant, cs_per_minute, kda_ratio, win_rate};
use crate::domain::player::Player;
use crate::domain::rank::PlayerRank;

/// Pre-fetched inputs for one analysis. The window is ordered newest game
/// first, exactly as the persistence layer serves it.
pub struct AnalysisInput<'a> {
    pub player: &'a Player,
    pub window: &'a [(MatchParticipant, Match)],
    pub current_rank: Option<&'a PlayerRank>,
    /// Snapshot history for the analyzed queue, oldest first.
    pub rank_history: &'a [PlayerRank],
}

/// Blended per-game performance index in [0, 1]: win rate is the strongest
/// signal, KDA and CS tempo follow.
fn performance_index(p: &MatchParticipant, m: &Match) -> f64 {
    let win = if p.win { 1.0 } else { 0.0 };
    let kda = (kda_ratio(p) / 6.0).min(1.0);
    let cs = (cs_per_minute(p, m) / 9.0).min(1.0);
    0.5 * win + 0.3 * kda + 0.2 * cs
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn participants(input: &AnalysisInput) -> Vec<MatchParticipant> {
    input.window.iter().map(|(p, _)| p.clone()).collect()
}

fn indices(input: &AnalysisInput) -> Vec<f64> {
    input
        .window
        .iter()
        .map(|(p, m)| performance_index(p, m))
        .collect()
}

/// Win rate over the window mapped through the fixed piecewise scale.
pub fn win_rate_analysis(input: &AnalysisInput) -> f64 {
    if input.window.is_empty() {
        return 0.0;
    }
    let rate = win_rate(&participants(input));
    if rate >= 0.70 {
        1.0
    } else if rate >= 0.60 {
        0.7
    } else if rate >= 0.55 {
        0.4
    } else {
        0.0
    }
}

/// Low account level paired with high performance. Monotone non-increasing
/// in level; the performance multiplier keeps an idle low-level account from
/// scoring.
pub fn account_level(input: &AnalysisInput) -> f64 {
    if input.window.is_empty() {
        return 0.0;
    }
    let level = input.player.summoner_level;
    let level_component = if level <= 0 {
        // Level unknown (summoner never ensured); no signal.
        0.0
    } else if level <= 30 {
        1.0
    } else if level <= 50 {
        0.8
    } else if level <= 100 {
        0.5
    } else if level <= 150 {
        0.2
    } else {
        0.0
    };
    let avg_kda = mean(
        &participants(input)
            .iter()
            .map(kda_ratio)
            .collect::<Vec<_>>(),
    );
    let performance_component = (avg_kda / 4.0).min(1.0);
    level_component * performance_component
}

/// Difference between the performance-implied ladder position and the actual
/// current rank, signed toward under-ranked. Three tiers of headroom maps to
/// a full score.
pub fn rank_discrepancy(input: &AnalysisInput) -> f64 {
    if input.window.is_empty() {
        return 0.0;
    }
    let Some(actual) = input.current_rank.and_then(|r| r.ladder_steps()) else {
        return 0.0;
    };
    let implied = mean(&indices(input)) * 36.0;
    let diff = implied - f64::from(actual);
    (diff / 12.0).clamp(0.0, 1.0)
}

/// Performance improvement from the older half of the window to the newer.
pub fn performance_trends(input: &AnalysisInput) -> f64 {
    let series = indices(input);
    if series.len() < 2 {
        return 0.0;
    }
    // Window is newest-first; the back half is the older one.
    let mid = series.len() / 2;
    let newer = mean(&series[..mid.max(1)]);
    let older = mean(&series[mid..]);
    ((newer - older) * 2.5).clamp(0.0, 1.0)
}

/// Win-rate improvement from the older half of the window to the newer.
pub fn win_rate_trends(input: &AnalysisInput) -> f64 {
    let games = participants(input);
    if games.len() < 4 {
        return 0.0;
    }
    let mid = games.len() / 2;
    let newer = win_rate(&games[..mid]);
    let older = win_rate(&games[mid..]);
    ((newer - older) * 2.0).clamp(0.0, 1.0)
}

/// Peak sustained performance in any single role played at least twice.
pub fn role_performance(input: &AnalysisInput) -> f64 {
    let mut by_role: std::collections::BTreeMap<&str, Vec<f64>> = Default::default();
    for (p, m) in input.window {
        by_role
            .entry(p.position.as_str())
            .or_default()
            .push(performance_index(p, m));
    }
    by_role
        .values()
        .filter(|scores| scores.len() >= 2)
        .map(|scores| mean(scores))
        .fold(0.0, f64::max)
        .clamp(0.0, 1.0)
}

/// Climb speed over the stored rank history: ladder steps gained across the
/// observed snapshots.
pub fn rank_progression(input: &AnalysisInput) -> f64 {
    let steps: Vec<u32> = input
        .rank_history
        .iter()
        .filter_map(|r| r.ladder_steps())
        .collect();
    if steps.len() < 2 {
        return 0.0;
    }
    let gained = f64::from(steps[steps.len() - 1]) - f64::from(steps[0]);
    (gained / 8.0).clamp(0.0, 1.0)
}

/// Steadiness of performance across the window; smurfs are steady where
/// genuinely new players swing.
pub fn performance_consistency(input: &AnalysisInput) -> f64 {
    let series = indices(input);
    if series.len() < 3 {
        return 0.0;
    }
    let avg = mean(&series);
    let variance = mean(
        &series
            .iter()
            .map(|value| (value - avg) * (value - avg))
            .collect::<Vec<_>>(),
    );
    let stddev = variance.sqrt();
    // Only steady AND strong performance counts; a consistent loser is not
    // a smurf signal.
    if avg < 0.5 {
        return 0.0;
    }
    (1.0 - stddev * 4.0).clamp(0.0, 1.0)
}

/// Average KDA over the window mapped through a fixed piecewise scale.
pub fn kda_analysis(input: &AnalysisInput) -> f64 {
    if input.window.is_empty() {
        return 0.0;
    }
    let avg = mean(
        &participants(input)
            .iter()
            .map(kda_ratio)
            .collect::<Vec<_>>(),
    );
    if avg >= 6.0 {
        1.0
    } else if avg >= 4.5 {
        0.7
    } else if avg >= 3.5 {
        0.4
    } else {
        0.0
    }
}
