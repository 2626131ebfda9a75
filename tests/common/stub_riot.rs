//! Programmable stand-in for the external game API, served over real HTTP so
//! the client, the rate limiter and the data manager are exercised end to
//! end. Behaviors (429 after N match fetches, persistent 503 on league
//! reads, vanished accounts) are toggled through shared state.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;

#[derive(Default)]
pub struct StubState {
	/// How many match ids the listing endpoint offers.
	pub match_count: AtomicU32,
	/// 0 disables; N >= 1 makes the Nth and later match fetches answer 429.
	pub rate_limit_match_fetches_after: AtomicU32,
	/// Retry-After seconds attached to stub 429 responses.
	pub retry_after_secs: AtomicU32,
	/// Non-zero makes league reads answer that HTTP status (e.g. 503).
	pub league_status_override: AtomicU32,
	/// PUUIDs the account endpoints no longer resolve.
	pub vanished: std::sync::Mutex<HashSet<String>>,

	pub account_requests: AtomicU32,
	pub summoner_requests: AtomicU32,
	pub league_requests: AtomicU32,
	pub match_id_requests: AtomicU32,
	pub match_requests: AtomicU32,
}

impl StubState {
	pub fn vanish(&self, puuid: &str) {
		self.vanished.lock().unwrap().insert(puuid.to_string());
	}
}

pub struct StubRiot {
	pub base_url: String,
	pub state: Arc<StubState>,
}

/// Binds the stub on an ephemeral port and serves it from a background task.
pub async fn spawn() -> StubRiot {
	let state = Arc::new(StubState {
		match_count: AtomicU32::new(20),
		retry_after_secs: AtomicU32::new(5),
		..StubState::default()
	});

	let router = Router::new()
		.route(
			"/riot/account/v1/accounts/by-riot-id/{name}/{tag}",
			get(account_by_riot_id),
		)
		.route(
			"/riot/account/v1/accounts/by-puuid/{puuid}",
			get(account_by_puuid),
		)
		.route(
			"/lol/summoner/v4/summoners/by-puuid/{puuid}",
			get(summoner_by_puuid),
		)
		.route(
			"/lol/league/v4/entries/by-summoner/{summoner_id}",
			get(league_entries),
		)
		.route(
			"/lol/match/v5/matches/by-puuid/{puuid}/ids",
			get(match_ids),
		)
		.route("/lol/match/v5/matches/{match_id}", get(match_by_id))
		.with_state(Arc::clone(&state));

	let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
		.await
		.expect("Failed to bind stub listener");
	let addr = listener.local_addr().expect("Failed to read stub address");

	tokio::spawn(async move {
		axum::serve(listener, router)
			.await
			.expect("Stub server failed");
	});

	StubRiot {
		base_url: format!("http://{addr}"),
		state,
	}
}

fn rate_limited_response(retry_after: u32) -> Response {
	let mut headers = HeaderMap::new();
	headers.insert("Retry-After", retry_after.to_string().parse().unwrap());
	headers.insert("X-Rate-Limit-Type", "application".parse().unwrap());
	headers.insert("X-App-Rate-Limit", "20:1,100:120".parse().unwrap());
	headers.insert("X-App-Rate-Limit-Count", "21:1,88:120".parse().unwrap());
	(StatusCode::TOO_MANY_REQUESTS, headers, "").into_response()
}

async fn account_by_riot_id(
	State(state): State<Arc<StubState>>,
	Path((name, tag)): Path<(String, String)>,
) -> Response {
	state.account_requests.fetch_add(1, Ordering::SeqCst);
	axum::Json(json!({
		"puuid": format!("puuid-{}", name.to_lowercase()),
		"gameName": name,
		"tagLine": tag,
	}))
	.into_response()
}

async fn account_by_puuid(
	State(state): State<Arc<StubState>>,
	Path(puuid): Path<String>,
) -> Response {
	state.account_requests.fetch_add(1, Ordering::SeqCst);
	if state.vanished.lock().unwrap().contains(&puuid) {
		return StatusCode::NOT_FOUND.into_response();
	}
	axum::Json(json!({
		"puuid": puuid,
		"gameName": "StubPlayer",
		"tagLine": "EUW",
	}))
	.into_response()
}

async fn summoner_by_puuid(
	State(state): State<Arc<StubState>>,
	Path(puuid): Path<String>,
) -> Response {
	state.summoner_requests.fetch_add(1, Ordering::SeqCst);
	axum::Json(json!({
		"puuid": puuid,
		"id": format!("summ-{puuid}"),
		"summonerLevel": 28,
	}))
	.into_response()
}

async fn league_entries(
	State(state): State<Arc<StubState>>,
	Path(summoner_id): Path<String>,
) -> Response {
	state.league_requests.fetch_add(1, Ordering::SeqCst);
	let override_status = state.league_status_override.load(Ordering::SeqCst);
	if override_status != 0 {
		return StatusCode::from_u16(override_status as u16)
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
			.into_response();
	}
	let _ = summoner_id;
	axum::Json(json!([{
		"queueType": "RANKED_SOLO_5x5",
		"tier": "GOLD",
		"rank": "II",
		"leaguePoints": 57,
		"wins": 40,
		"losses": 28,
		"hotStreak": false,
	}]))
	.into_response()
}

async fn match_ids(
	State(state): State<Arc<StubState>>,
	Path(puuid): Path<String>,
) -> Response {
	state.match_id_requests.fetch_add(1, Ordering::SeqCst);
	let count = state.match_count.load(Ordering::SeqCst);
	let ids: Vec<String> = (1..=count)
		.map(|i| format!("STUB-{puuid}-{i:04}"))
		.collect();
	axum::Json(json!(ids)).into_response()
}

async fn match_by_id(
	State(state): State<Arc<StubState>>,
	Path(match_id): Path<String>,
) -> Response {
	let fetches_so_far = state.match_requests.fetch_add(1, Ordering::SeqCst) + 1;
	let limit_after = state.rate_limit_match_fetches_after.load(Ordering::SeqCst);
	if limit_after != 0 && fetches_so_far >= limit_after {
		return rate_limited_response(state.retry_after_secs.load(Ordering::SeqCst));
	}

	// Ten deterministic participants; the first carries the puuid embedded
	// in the match id so tracked players land in their own matches.
	let owner = owner_puuid(&match_id);
	let mut metadata_participants = Vec::new();
	let mut info_participants = Vec::new();
	for i in 0..10 {
		let puuid = if i == 0 {
			owner.clone()
		} else {
			format!("{owner}-opponent-{i}")
		};
		metadata_participants.push(json!(puuid));
		info_participants.push(json!({
			"puuid": puuid,
			"championId": 10 + i,
			"championName": "Kayle",
			"teamId": if i < 5 { 100 } else { 200 },
			"win": i < 5,
			"kills": 9, "deaths": 2, "assists": 7,
			"totalMinionsKilled": 160,
			"neutralMinionsKilled": 20,
			"goldEarned": 12_000,
			"totalDamageDealtToChampions": 21_000,
			"visionScore": 16,
			"teamPosition": "MID",
		}));
	}

	axum::Json(json!({
		"metadata": {
			"matchId": match_id,
			"participants": metadata_participants,
		},
		"info": {
			"gameCreation": 1_750_000_000_000u64,
			"gameDuration": 1850,
			"gameMode": "CLASSIC",
			"gameVersion": "15.4.570.1234",
			"queueId": 420,
			"platformId": "EUW1",
			"participants": info_participants,
		},
	}))
	.into_response()
}

/// Recovers the owning puuid a stub match id was minted for.
fn owner_puuid(match_id: &str) -> String {
	match_id
		.strip_prefix("STUB-")
		.and_then(|rest| rest.rsplit_once('-'))
		.map(|(owner, _)| owner.to_string())
		.unwrap_or_else(|| "puuid-stub-unknown".to_string())
}
