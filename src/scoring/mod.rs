//! Multi-factor smurf scoring.
//!
//! Nine weighted analyzers produce a composite score in [0, 1] that buckets
//! into a confidence level. The weight table must sum to 1.0 within ±0.01;
//! the engine refuses to construct otherwise. Given identical inputs two
//! runs produce byte-identical factor scores and overall score: factors are
//! pure and the aggregation iterates a fixed order.

pub mod factors;

use std::collections::BTreeMap;

use serde_json::json;

pub use factors::AnalysisInput;

use crate::configuration::ScoringSettings;
use crate::domain::detection::Confidence;
use crate::domain::error::{ErrorKind, Result};

/// Fixed factor order; aggregation and the persisted score map follow it.
pub const FACTORS: [(&str, fn(&AnalysisInput) -> f64); 9] = [
    ("rank_discrepancy", factors::rank_discrepancy),
    ("win_rate", factors::win_rate_analysis),
    ("performance_trends", factors::performance_trends),
    ("win_rate_trends", factors::win_rate_trends),
    ("role_performance", factors::role_performance),
    ("rank_progression", factors::rank_progression),
    ("account_level", factors::account_level),
    ("performance_consistency", factors::performance_consistency),
    ("kda", factors::kda_analysis),
];

/// The shipped weight table.
pub fn default_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("rank_discrepancy".to_string(), 0.20),
        ("win_rate".to_string(), 0.18),
        ("performance_trends".to_string(), 0.15),
        ("win_rate_trends".to_string(), 0.10),
        ("role_performance".to_string(), 0.09),
        ("rank_progression".to_string(), 0.09),
        ("account_level".to_string(), 0.08),
        ("performance_consistency".to_string(), 0.08),
        ("kda".to_string(), 0.03),
    ])
}

/// Outcome of one scoring run, ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub overall: f64,
    pub factors: BTreeMap<String, f64>,
    pub confidence: Confidence,
    pub games_analyzed: i32,
}

impl ScoreReport {
    pub fn factors_json(&self) -> serde_json::Value {
        json!(self.factors)
    }
}

#[derive(Debug)]
pub struct ScoringEngine {
    weights: BTreeMap<String, f64>,
    window: usize,
    version: String,
}

impl ScoringEngine {
    /// Validates the weight table and builds the engine. The only fatal
    /// configuration error the scoring path can raise, and it is raised
    /// here, before any factor function runs.
    pub fn new(settings: &ScoringSettings) -> Result<Self> {
        let weights = settings.weights.clone().unwrap_or_else(default_weights);

        for (name, _) in FACTORS {
            let Some(weight) = weights.get(name) else {
                return Err((
                    ErrorKind::ConfigInvalid,
                    "scoring weight table is missing a factor",
                    name.to_string(),
                )
                    .into());
            };
            if !(0.0..=1.0).contains(weight) {
                return Err((
                    ErrorKind::ConfigInvalid,
                    "scoring weight outside [0, 1]",
                    format!("{name} = {weight}"),
                )
                    .into());
            }
        }
        if let Some(unknown) = weights.keys().find(|name| {
            !FACTORS
                .iter()
                .any(|(known, _)| known == &name.as_str())
        }) {
            return Err((
                ErrorKind::ConfigInvalid,
                "scoring weight table names an unknown factor",
                unknown.clone(),
            )
                .into());
        }

        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > 0.01 {
            return Err((
                ErrorKind::ConfigInvalid,
                "scoring weights do not sum to 1.0",
                format!("sum = {sum:.4}"),
            )
                .into());
        }

        Ok(Self {
            weights,
            window: settings.analysis_window,
            version: settings.analysis_version.clone(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// How many recent matches one analysis consumes.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Scores one player from pre-fetched rows. Pure; no IO.
    pub fn score(&self, input: &AnalysisInput) -> ScoreReport {
        let mut factor_scores = BTreeMap::new();
        let mut overall = 0.0;
        for (name, factor) in FACTORS {
            let score = factor(input);
            overall += score * self.weights[name];
            factor_scores.insert(name.to_string(), score);
        }
        let overall = overall.clamp(0.0, 1.0);

        ScoreReport {
            overall,
            factors: factor_scores,
            confidence: Confidence::from_score(overall),
            games_analyzed: input.window.len() as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::factors::tests::{sample_game, sample_player, sample_rank};
    use super::*;
    use claims::{assert_err, assert_ok};

    fn settings_with(weights: Option<BTreeMap<String, f64>>) -> ScoringSettings {
        ScoringSettings {
            analysis_window: 25,
            analysis_version: "smurf-v2".to_string(),
            weights,
        }
    }

    #[test]
    fn default_weights_validate() {
        assert_ok!(ScoringEngine::new(&settings_with(None)));
    }

    #[test]
    fn weights_off_by_three_percent_are_refused() {
        let mut weights = default_weights();
        weights.insert("kda".to_string(), 0.0);
        // Sum is now 0.97.
        let err = assert_err!(ScoringEngine::new(&settings_with(Some(weights))));
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn missing_and_unknown_factors_are_refused() {
        let mut weights = default_weights();
        weights.remove("win_rate");
        weights.insert("coin_flip".to_string(), 0.18);
        assert_err!(ScoringEngine::new(&settings_with(Some(weights))));
    }

    #[test]
    fn scoring_is_deterministic() {
        let engine = ScoringEngine::new(&settings_with(None)).unwrap();
        let player = sample_player(25);
        let window: Vec<_> = (0..25)
            .map(|i| sample_game(i, 11, 2, 7, i % 5 != 0, "MID"))
            .collect();
        let rank = sample_rank("BRONZE", "II");
        let input = AnalysisInput {
            player: &player,
            window: &window,
            current_rank: Some(&rank),
            rank_history: &[],
        };

        let first = engine.score(&input);
        let second = engine.score(&input);
        assert_eq!(first.overall.to_bits(), second.overall.to_bits());
        for (name, score) in &first.factors {
            assert_eq!(score.to_bits(), second.factors[name].to_bits());
        }
    }

    #[test]
    fn report_bucket_matches_thresholds() {
        let engine = ScoringEngine::new(&settings_with(None)).unwrap();
        let player = sample_player(22);
        let window: Vec<_> = (0..25)
            .map(|i| sample_game(i, 14, 1, 9, true, "MID"))
            .collect();
        let rank = sample_rank("IRON", "IV");
        let history = vec![sample_rank("IRON", "IV"), sample_rank("GOLD", "III")];
        let input = AnalysisInput {
            player: &player,
            window: &window,
            current_rank: Some(&rank),
            rank_history: &history,
        };

        let report = engine.score(&input);
        assert!(report.overall >= 0.0 && report.overall <= 1.0);
        assert_eq!(report.confidence, Confidence::from_score(report.overall));
        assert_eq!(report.games_analyzed, 25);
        // An undisputed stomper on a fresh account lands at least medium.
        assert!(report.confidence.is_flagged());
    }

    #[test]
    fn empty_window_scores_unlikely() {
        let engine = ScoringEngine::new(&settings_with(None)).unwrap();
        let player = sample_player(25);
        let input = AnalysisInput {
            player: &player,
            window: &[],
            current_rank: None,
            rank_history: &[],
        };
        let report = engine.score(&input);
        assert_eq!(report.overall, 0.0);
        assert_eq!(report.confidence, Confidence::Unlikely);
    }
}
