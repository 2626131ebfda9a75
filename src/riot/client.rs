//! Region/platform-routed HTTP client for the external game API.
//!
//! Every operation runs through the rate limiter, authenticates with the
//! active key, retries transient failures with exponential backoff and full
//! jitter, and classifies the final response into an [`ApiOutcome`]. A 429
//! is never retried here; it is surfaced so the caller can record it and
//! yield.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::configuration::RiotSettings;
use crate::db::{DbPool, rate_limit_log};
use crate::domain::error::{ErrorKind, Result};
use crate::domain::rate_limit::{NewRateLimitEvent, RateLimitScope};
use crate::riot::dto::{AccountDto, CurrentGameDto, LeagueEntryDto, MatchDto, SummonerDto};
use crate::riot::routing::{MethodFamily, Platform, Region};
use crate::riot::{ApiKeyProvider, ApiOutcome, RateLimiter};

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(8);

/// Paging and filter options for the match-id listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchIdsFilter {
    pub start: Option<u32>,
    pub count: Option<u32>,
    pub queue: Option<i32>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl MatchIdsFilter {
    pub fn recent(count: u32) -> Self {
        Self {
            count: Some(count),
            ..Self::default()
        }
    }

    fn query_string(&self) -> String {
        let mut parts = Vec::new();
        if let Some(start) = self.start {
            parts.push(format!("start={start}"));
        }
        if let Some(count) = self.count {
            parts.push(format!("count={count}"));
        }
        if let Some(queue) = self.queue {
            parts.push(format!("queue={queue}"));
        }
        if let Some(start_time) = self.start_time {
            parts.push(format!("startTime={start_time}"));
        }
        if let Some(end_time) = self.end_time {
            parts.push(format!("endTime={end_time}"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }
}

pub struct RiotClient {
    http: reqwest::Client,
    pool: DbPool,
    limiter: Arc<RateLimiter>,
    keys: Arc<dyn ApiKeyProvider>,
    retry_attempts: u32,
    host_override: Option<String>,
}

impl RiotClient {
    pub fn new(
        settings: &RiotSettings,
        pool: DbPool,
        limiter: Arc<RateLimiter>,
        keys: Arc<dyn ApiKeyProvider>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            pool,
            limiter,
            keys,
            retry_attempts: settings.retry_attempts.max(1),
            host_override: None,
        })
    }

    /// Routes every host family to one base URL. Test hook for driving the
    /// client against a local stub server.
    pub fn with_host_override(mut self, base: impl Into<String>) -> Self {
        self.host_override = Some(base.into());
        self
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    pub(crate) fn regional_host(&self, region: Region) -> String {
        self.host_override.clone().unwrap_or_else(|| region.host())
    }

    pub(crate) fn platform_host(&self, platform: Platform) -> String {
        self.host_override
            .clone()
            .unwrap_or_else(|| platform.host())
    }

    pub async fn account_by_riot_id(
        &self,
        region: Region,
        game_name: &str,
        tag_line: &str,
    ) -> Result<ApiOutcome<AccountDto>> {
        let path = format!("/riot/account/v1/accounts/by-riot-id/{game_name}/{tag_line}");
        self.get_json(self.regional_host(region), MethodFamily::AccountByRiotId, &path)
            .await
    }

    pub async fn account_by_puuid(
        &self,
        region: Region,
        puuid: &str,
    ) -> Result<ApiOutcome<AccountDto>> {
        let path = format!("/riot/account/v1/accounts/by-puuid/{puuid}");
        self.get_json(self.regional_host(region), MethodFamily::AccountByPuuid, &path)
            .await
    }

    pub async fn summoner_by_puuid(
        &self,
        platform: Platform,
        puuid: &str,
    ) -> Result<ApiOutcome<SummonerDto>> {
        let path = format!("/lol/summoner/v4/summoners/by-puuid/{puuid}");
        self.get_json(self.platform_host(platform), MethodFamily::SummonerByPuuid, &path)
            .await
    }

    pub async fn match_ids_by_puuid(
        &self,
        region: Region,
        puuid: &str,
        filter: &MatchIdsFilter,
    ) -> Result<ApiOutcome<Vec<String>>> {
        let path = format!(
            "/lol/match/v5/matches/by-puuid/{puuid}/ids{}",
            filter.query_string()
        );
        self.get_json(self.regional_host(region), MethodFamily::MatchIdsByPuuid, &path)
            .await
    }

    pub async fn match_by_id(
        &self,
        region: Region,
        match_id: &str,
    ) -> Result<ApiOutcome<MatchDto>> {
        let path = format!("/lol/match/v5/matches/{match_id}");
        self.get_json(self.regional_host(region), MethodFamily::MatchById, &path)
            .await
    }

    pub async fn league_entries_by_summoner(
        &self,
        platform: Platform,
        summoner_id: &str,
    ) -> Result<ApiOutcome<Vec<LeagueEntryDto>>> {
        let path = format!("/lol/league/v4/entries/by-summoner/{summoner_id}");
        self.get_json(self.platform_host(platform), MethodFamily::LeagueEntries, &path)
            .await
    }

    pub async fn active_game_by_puuid(
        &self,
        platform: Platform,
        puuid: &str,
    ) -> Result<ApiOutcome<CurrentGameDto>> {
        let path = format!("/lol/spectator/v5/active-games/by-summoner/{puuid}");
        self.get_json(self.platform_host(platform), MethodFamily::ActiveGame, &path)
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        host: String,
        family: MethodFamily,
        path: &str,
    ) -> Result<ApiOutcome<T>> {
        let Some(key) = self.keys.api_key() else {
            return Err((
                ErrorKind::ConfigInvalid,
                "external API key is not configured",
            )
                .into());
        };

        let url = format!("{host}{path}");
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.limiter.acquire(&host, family).await;

            let response = self
                .http
                .get(&url)
                .header("X-Riot-Token", key.expose_secret())
                .send()
                .await;

            let status = match &response {
                Ok(response) => Some(response.status()),
                Err(_) => None,
            };

            match response {
                Ok(response) if response.status().is_success() => {
                    return match response.json::<T>().await {
                        Ok(dto) => Ok(ApiOutcome::Found(dto)),
                        Err(err) => Ok(ApiOutcome::Fatal {
                            status: status.map(|s| s.as_u16()).unwrap_or(200),
                            message: format!("response body failed validation: {err}"),
                        }),
                    };
                }
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                    return Ok(ApiOutcome::NotFound);
                }
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = parse_retry_after(response.headers());
                    let scope = parse_limit_scope(response.headers());
                    self.limiter
                        .observe_rate_limited(&host, family, scope, retry_after);
                    self.log_throttle(family, scope, response.headers(), retry_after, &host);
                    return Ok(ApiOutcome::RateLimited { retry_after });
                }
                Ok(response) if response.status().is_server_error() => {
                    if attempt >= self.retry_attempts {
                        return Ok(ApiOutcome::Transient {
                            status: Some(response.status().as_u16()),
                        });
                    }
                    debug!(
                        "{} answered {}, retrying (attempt {attempt})",
                        family,
                        response.status()
                    );
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    return Ok(ApiOutcome::Fatal {
                        status,
                        message: truncate(&message, 200),
                    });
                }
                Err(err) if err.is_timeout() || err.is_connect() || err.is_request() => {
                    if attempt >= self.retry_attempts {
                        return Ok(ApiOutcome::Transient { status: None });
                    }
                    debug!("{} transport error, retrying (attempt {attempt}): {err}", family);
                }
                Err(err) => return Err(err.into()),
            }

            sleep(backoff_with_jitter(attempt)).await;
        }
    }

    /// Appends the throttling event to the rate-limit log. Logging must not
    /// fail the request that observed the 429.
    fn log_throttle(
        &self,
        family: MethodFamily,
        scope: RateLimitScope,
        headers: &HeaderMap,
        retry_after: Option<Duration>,
        host: &str,
    ) {
        let (limit_value, observed) = match scope {
            RateLimitScope::Method => (
                parse_first_limit(headers, "X-Method-Rate-Limit"),
                parse_first_limit(headers, "X-Method-Rate-Limit-Count"),
            ),
            _ => (
                parse_first_limit(headers, "X-App-Rate-Limit"),
                parse_first_limit(headers, "X-App-Rate-Limit-Count"),
            ),
        };
        let event = NewRateLimitEvent {
            scope,
            endpoint: family.to_string(),
            limit_value,
            observed,
            retry_after_secs: retry_after.map(|d| d.as_secs() as i32),
            context: Some(host.to_string()),
        };

        match self.pool.get() {
            Ok(mut conn) => {
                if let Err(err) = rate_limit_log::append(&mut conn, event) {
                    warn!("Failed to record throttling event: {err}");
                }
            }
            Err(err) => warn!("Failed to record throttling event: {err}"),
        }
    }
}

/// Exponential backoff with full jitter: a uniform draw from zero up to the
/// doubled base, capped.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(8);
    let ceiling = BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(exp))
        .min(BACKOFF_CAP);
    let millis = ceiling.as_millis() as u64;
    Duration::from_millis(rand::rng().random_range(0..=millis))
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("Retry-After")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// `X-Rate-Limit-Type` names the violated scope; absent means an edge
/// throttle, treated as service-wide.
fn parse_limit_scope(headers: &HeaderMap) -> RateLimitScope {
    match headers
        .get("X-Rate-Limit-Type")
        .and_then(|v| v.to_str().ok())
    {
        Some("application") => RateLimitScope::App,
        Some("method") => RateLimitScope::Method,
        _ => RateLimitScope::Service,
    }
}

/// First window of a limit header shaped like `20:1,100:120`.
fn parse_first_limit(headers: &HeaderMap, name: &str) -> Option<i32> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .split(':')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn truncate(message: &str, max: usize) -> String {
    if message.len() <= max {
        message.to_string()
    } else {
        let mut cut = max;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &message[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn retry_after_parses_whole_seconds() {
        let map = headers(&[("Retry-After", "7")]);
        assert_eq!(parse_retry_after(&map), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn limit_scope_defaults_to_service() {
        assert_eq!(
            parse_limit_scope(&headers(&[("X-Rate-Limit-Type", "application")])),
            RateLimitScope::App
        );
        assert_eq!(
            parse_limit_scope(&headers(&[("X-Rate-Limit-Type", "method")])),
            RateLimitScope::Method
        );
        assert_eq!(parse_limit_scope(&HeaderMap::new()), RateLimitScope::Service);
    }

    #[test]
    fn first_limit_window_is_extracted() {
        let map = headers(&[("X-App-Rate-Limit", "20:1,100:120")]);
        assert_eq!(parse_first_limit(&map, "X-App-Rate-Limit"), Some(20));
        let map = headers(&[("X-App-Rate-Limit-Count", "19:1,88:120")]);
        assert_eq!(parse_first_limit(&map, "X-App-Rate-Limit-Count"), Some(19));
    }

    #[test]
    fn match_id_filters_render_as_query_strings() {
        assert_eq!(MatchIdsFilter::default().query_string(), "");
        let filter = MatchIdsFilter {
            start: Some(0),
            count: Some(20),
            queue: Some(420),
            start_time: None,
            end_time: None,
        };
        assert_eq!(filter.query_string(), "?start=0&count=20&queue=420");
    }

    #[test]
    fn backoff_stays_inside_the_cap() {
        for attempt in 1..12 {
            assert!(backoff_with_jitter(attempt) <= BACKOFF_CAP);
        }
    }
}
