//! Scoring determinism over persisted data (two runs on unchanged inputs
//! produce byte-identical rows) and the analyzer's end-to-end persistence.

mod common;

use claims::assert_ok;
use riftguard::configuration::ScoringSettings;
use riftguard::db;
use riftguard::domain::detection::{Confidence, NewSmurfDetection};
use riftguard::domain::jobs::{ExecutionStatus, JobKind};
use riftguard::domain::matches::RANKED_SOLO_QUEUE;
use riftguard::domain::rank::RANKED_SOLO;
use riftguard::jobs::control::TriggerOutcome;
use riftguard::scoring::{AnalysisInput, ScoringEngine};

use crate::common::{
	TestHarness, await_execution, create_test_player, create_test_rank, ingest_test_match,
};

fn seed_analyzable_player(harness: &TestHarness, puuid: &str, games: i32) {
	let mut conn = harness.get_conn();
	create_test_player(&mut conn, puuid, true);
	for seq in 0..games {
		// Four wins out of five, strong stats throughout.
		ingest_test_match(&mut conn, puuid, seq, seq % 5 != 0);
	}
	create_test_rank(&mut conn, puuid, "SILVER", "III");
}

#[tokio::test]
async fn scoring_twice_on_unchanged_inputs_is_byte_identical() {
	let harness = TestHarness::new();
	seed_analyzable_player(&harness, "puuid-s3", 25);

	let engine = ScoringEngine::new(&ScoringSettings::default()).unwrap();
	let mut conn = harness.get_conn();
	let player = db::players::get_by_puuid(&mut conn, "puuid-s3").unwrap();
	let window =
		db::participants::recent_for_player(&mut conn, "puuid-s3", engine.window() as i64)
			.unwrap();
	assert_eq!(window.len(), 25);
	let current_rank = db::ranks::current_for_queue(&mut conn, "puuid-s3", RANKED_SOLO).unwrap();
	let history = db::ranks::history_for_queue(&mut conn, "puuid-s3", RANKED_SOLO).unwrap();

	let input = AnalysisInput {
		player: &player,
		window: &window,
		current_rank: current_rank.as_ref(),
		rank_history: &history,
	};
	let first = engine.score(&input);
	let second = engine.score(&input);

	assert_eq!(first.overall.to_bits(), second.overall.to_bits());
	assert_eq!(first.factors.len(), 9);
	for (name, score) in &first.factors {
		assert_eq!(
			score.to_bits(),
			second.factors[name].to_bits(),
			"factor {name} diverged"
		);
		assert!((0.0..=1.0).contains(score));
	}
	assert_eq!(first.confidence, Confidence::from_score(first.overall));

	// Two persisted runs yield two rows with equal scores; history is kept.
	for report in [&first, &second] {
		db::detections::insert(
			&mut conn,
			NewSmurfDetection {
				puuid: "puuid-s3".to_string(),
				overall_score: report.overall,
				factor_scores: report.factors_json(),
				confidence: report.confidence,
				games_analyzed: report.games_analyzed,
				queue_id: Some(RANKED_SOLO_QUEUE),
				analysis_version: engine.version().to_string(),
			},
		)
		.unwrap();
	}
	let rows = db::detections::history_for_player(&mut conn, "puuid-s3").unwrap();
	assert_eq!(rows.len(), 2);
	assert_eq!(rows[0].overall_score.to_bits(), rows[1].overall_score.to_bits());
	assert_eq!(rows[0].factor_scores, rows[1].factor_scores);
}

#[tokio::test]
async fn analyzer_job_persists_a_detection_and_marks_the_player() {
	let harness = TestHarness::new();
	seed_analyzable_player(&harness, "puuid-analyze", 12);

	let outcome = assert_ok!(harness.app.control.trigger(JobKind::PlayerAnalyzer));
	let TriggerOutcome::Started(execution_id) = outcome else {
		panic!("trigger rejected: {outcome:?}");
	};
	let execution = await_execution(&harness.db_pool, &execution_id, 30).await;
	assert_eq!(execution.status, ExecutionStatus::Success);

	let mut conn = harness.get_conn();
	let latest = db::detections::latest_for_player(&mut conn, "puuid-analyze")
		.unwrap()
		.expect("no detection stored");
	assert!((0.0..=1.0).contains(&latest.overall_score));
	assert_eq!(latest.games_analyzed, 12);
	assert_eq!(latest.queue_id, Some(RANKED_SOLO_QUEUE));
	assert_eq!(latest.confidence, Confidence::from_score(latest.overall_score));

	let player = db::players::get_by_puuid(&mut conn, "puuid-analyze").unwrap();
	assert!(player.is_analyzed);
}

#[tokio::test]
async fn reanalysis_waits_for_the_age_threshold() {
	let harness = TestHarness::new();
	seed_analyzable_player(&harness, "puuid-reanalyze", 12);

	// First pass analyzes the player.
	let TriggerOutcome::Started(first_id) =
		assert_ok!(harness.app.control.trigger(JobKind::PlayerAnalyzer))
	else {
		panic!("first trigger rejected");
	};
	await_execution(&harness.db_pool, &first_id, 30).await;

	// A second pass inside the reanalysis window finds nothing to do.
	let TriggerOutcome::Started(second_id) =
		assert_ok!(harness.app.control.trigger(JobKind::PlayerAnalyzer))
	else {
		panic!("second trigger rejected");
	};
	let second = await_execution(&harness.db_pool, &second_id, 30).await;
	assert_eq!(second.status, ExecutionStatus::Success);

	let mut conn = harness.get_conn();
	let rows = db::detections::history_for_player(&mut conn, "puuid-reanalyze").unwrap();
	assert_eq!(rows.len(), 1);
}
