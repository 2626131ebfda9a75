use chrono::{DateTime, Duration, Utc};
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{Text, Timestamptz};
use fake::Fake;
use fake::faker::internet::en::Username;
use riftguard::db::{self, DbConn};
use riftguard::domain::jobs::{ExecutionStatus, JobExecution, JobKind};
use riftguard::domain::matches::NewMatch;
use riftguard::domain::participant::NewMatchParticipant;
use riftguard::domain::player::{NewPlayer, Player};
use riftguard::domain::rank::{NewPlayerRank, RANKED_SOLO};

/// Inserts a player row directly, optionally flagged for tracking.
pub fn create_test_player(conn: &mut DbConn, puuid: &str, tracked: bool) -> Player {
	let player = db::players::upsert(
		conn,
		NewPlayer {
			puuid: puuid.to_string(),
			game_name: Username().fake(),
			tag_line: "EUW".to_string(),
			platform: "euw1".to_string(),
			summoner_id: Some(format!("summ-{puuid}")),
			summoner_level: 30,
			is_tracked: tracked,
		},
	)
	.expect("Failed to create player");
	if tracked {
		db::players::set_tracked(conn, puuid, true).expect("Failed to flag player");
	}
	player
}

/// Inserts one stored match with ten participants; the given player is the
/// first participant on the winning team.
pub fn ingest_test_match(conn: &mut DbConn, puuid: &str, seq: i32, win: bool) {
	let match_id = format!("EUW1_{seq:07}");
	let mut participants = Vec::new();
	for i in 0..10 {
		let member = if i == 0 {
			puuid.to_string()
		} else {
			format!("{puuid}-mate-{i}")
		};
		create_test_player(conn, &member, false);
		participants.push(NewMatchParticipant {
			match_id: match_id.clone(),
			puuid: member,
			champion_id: 100 + i,
			champion_name: "Ahri".to_string(),
			team_id: if i < 5 { 100 } else { 200 },
			win: if i < 5 { win } else { !win },
			kills: 8,
			deaths: 2,
			assists: 6,
			cs: 190,
			gold_earned: 11_000,
			damage_to_champions: 18_000,
			vision_score: 14,
			position: "MID".to_string(),
		});
	}

	db::matches::insert_with_participants(
		conn,
		NewMatch {
			match_id,
			platform: "euw1".to_string(),
			queue_id: 420,
			game_mode: "CLASSIC".to_string(),
			game_creation: Utc::now() - Duration::hours(i64::from(seq)),
			game_duration_secs: 1800,
			game_version: "15.4.1".to_string(),
			is_processed: true,
		},
		participants,
	)
	.expect("Failed to ingest match");
}

/// Inserts a current solo-queue rank snapshot for the player.
pub fn create_test_rank(conn: &mut DbConn, puuid: &str, tier: &str, division: &str) {
	db::ranks::upsert_current(
		conn,
		NewPlayerRank {
			puuid: puuid.to_string(),
			queue_type: RANKED_SOLO.to_string(),
			tier: tier.to_string(),
			division: division.to_string(),
			league_points: 42,
			wins: 30,
			losses: 25,
			hot_streak: false,
			is_current: true,
			fetched_at: Utc::now(),
		},
	)
	.expect("Failed to create rank");
}

/// Backdates a tracker row so the next ensure sees it as stale.
pub fn backdate_tracker(conn: &mut DbConn, kind: &str, identifier: &str, age: Duration) {
	let fetched: DateTime<Utc> = Utc::now() - age;
	sql_query(
		"UPDATE data_tracking SET last_fetched = $1 \
		 WHERE data_type = $2::data_kind AND identifier = $3",
	)
	.bind::<Timestamptz, _>(fetched)
	.bind::<Text, _>(kind)
	.bind::<Text, _>(identifier)
	.execute(conn)
	.expect("Failed to backdate tracker");
}

/// Marks a tracker row as freshly fetched.
pub fn touch_tracker(conn: &mut DbConn, kind: riftguard::domain::tracking::DataKind, ident: &str) {
	db::data_tracking::record_fetch(conn, kind, ident).expect("Failed to touch tracker");
}

/// Polls the ledger until the execution reaches a terminal status.
pub async fn await_execution(
	pool: &riftguard::db::DbPool,
	execution_id: &uuid::Uuid,
	timeout_secs: u64,
) -> JobExecution {
	let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(timeout_secs);
	loop {
		{
			let mut conn = pool.get().expect("Failed to get connection");
			let execution = db::job_executions::get(&mut conn, execution_id)
				.expect("Failed to read execution")
				.expect("Execution row vanished");
			if execution.status.is_terminal() {
				return execution;
			}
		}
		assert!(
			tokio::time::Instant::now() < deadline,
			"execution {execution_id} did not terminate in {timeout_secs}s"
		);
		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
	}
}

/// All executions recorded for a job kind, newest first.
pub fn executions_for(conn: &mut DbConn, kind: JobKind) -> Vec<JobExecution> {
	let config = db::job_configurations::find_by_type(conn, kind)
		.expect("Failed to load configuration")
		.expect("Job kind is not seeded");
	db::job_executions::list_recent(conn, &config.id, 100, 0).expect("Failed to list executions")
}

/// Asserts ledger invariants every terminal execution must satisfy.
pub fn assert_terminal_invariants(execution: &JobExecution) {
	assert!(execution.status.is_terminal());
	assert!(
		matches!(
			execution.status,
			ExecutionStatus::Success
				| ExecutionStatus::Failed
				| ExecutionStatus::RateLimited
				| ExecutionStatus::Skipped
		),
		"unexpected terminal status {:?}",
		execution.status
	);
	let finished = execution.finished_at.expect("terminal run lacks finished_at");
	assert!(finished >= execution.started_at);
}
