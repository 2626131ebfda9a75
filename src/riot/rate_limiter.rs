//! Local admission control for the external API.
//!
//! Two token buckets guard the application scope of every host (per-second
//! and per-two-minutes) and one guards each endpoint family. A request is
//! admitted only when every applicable bucket holds a token; admission
//! decrements them atomically. Local capacities sit below the published
//! server limits by the configured safety margins. A server 429 forces the
//! affected scope empty until the `Retry-After` deadline.
//!
//! Waiters on the same `(host, family)` key proceed in FIFO order; across
//! keys no global fairness is attempted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};

use crate::configuration::RiotSettings;
use crate::domain::rate_limit::RateLimitScope;
use crate::riot::routing::MethodFamily;

/// Applied when a 429 carries no `Retry-After`.
const DEFAULT_BLOCK: Duration = Duration::from_secs(1);
/// Floor for re-check sleeps so a zero-length wait cannot spin.
const MIN_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub app_per_second: u32,
    pub app_per_two_minutes: u32,
    pub method_per_ten_seconds: u32,
    pub app_margin: f64,
    pub method_margin: f64,
}

impl From<&RiotSettings> for RateLimiterConfig {
    fn from(settings: &RiotSettings) -> Self {
        Self {
            app_per_second: settings.app_limit_per_second,
            app_per_two_minutes: settings.app_limit_per_two_minutes,
            method_per_ten_seconds: settings.method_limit_per_ten_seconds,
            app_margin: settings.app_limit_margin,
            method_margin: settings.method_limit_margin,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    capacity: u32,
    window: Duration,
    tokens: u32,
    window_started: Instant,
}

impl Bucket {
    fn new(limit: u32, window: Duration, margin: f64) -> Self {
        let capacity = ((f64::from(limit) * margin).floor() as u32).max(1);
        Self {
            capacity,
            window,
            tokens: capacity,
            window_started: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        if now.duration_since(self.window_started) >= self.window {
            self.tokens = self.capacity;
            self.window_started = now;
        }
    }

    /// Zero when a token is available, otherwise the wait until refill.
    fn wait(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens > 0 {
            Duration::ZERO
        } else {
            self.window
                .saturating_sub(now.duration_since(self.window_started))
        }
    }

    fn take(&mut self) {
        debug_assert!(self.tokens > 0);
        self.tokens -= 1;
    }
}

#[derive(Debug)]
struct MethodState {
    bucket: Bucket,
    blocked_until: Option<Instant>,
}

#[derive(Debug)]
struct HostState {
    per_second: Bucket,
    per_two_minutes: Bucket,
    blocked_until: Option<Instant>,
    methods: HashMap<MethodFamily, MethodState>,
}

impl HostState {
    fn new(config: &RateLimiterConfig) -> Self {
        Self {
            per_second: Bucket::new(
                config.app_per_second,
                Duration::from_secs(1),
                config.app_margin,
            ),
            per_two_minutes: Bucket::new(
                config.app_per_two_minutes,
                Duration::from_secs(120),
                config.app_margin,
            ),
            blocked_until: None,
            methods: HashMap::new(),
        }
    }
}

fn block_wait(blocked_until: &mut Option<Instant>, now: Instant) -> Duration {
    match *blocked_until {
        Some(until) if until > now => until.duration_since(now),
        Some(_) => {
            *blocked_until = None;
            Duration::ZERO
        }
        None => Duration::ZERO,
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    hosts: Mutex<HashMap<String, HostState>>,
    gates: Mutex<HashMap<(String, MethodFamily), Arc<tokio::sync::Mutex<()>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            hosts: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks until every applicable bucket admits the request, then
    /// decrements them. Never fails; the caller bounds the wait if it wants
    /// to yield instead (see [`RateLimiter::acquire_within`]).
    pub async fn acquire(&self, host: &str, family: MethodFamily) {
        let gate = self.gate(host, family);
        let _guard = gate.lock().await;
        loop {
            match self.try_acquire(host, family) {
                Ok(()) => return,
                Err(wait) => sleep(wait.max(MIN_SLEEP)).await,
            }
        }
    }

    /// Like [`RateLimiter::acquire`] but gives up once `max_wait` has
    /// elapsed, returning the wait still outstanding at that point. Jobs
    /// treat the error as a signal to yield.
    pub async fn acquire_within(
        &self,
        host: &str,
        family: MethodFamily,
        max_wait: Duration,
    ) -> Result<(), Duration> {
        match timeout(max_wait, self.acquire(host, family)).await {
            Ok(()) => Ok(()),
            Err(_) => Err(self.current_wait(host, family)),
        }
    }

    /// Single non-blocking admission check; decrements on success.
    pub fn try_acquire(&self, host: &str, family: MethodFamily) -> Result<(), Duration> {
        let now = Instant::now();
        let mut hosts = self.hosts.lock().unwrap();
        let host_state = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(&self.config));

        let HostState {
            per_second,
            per_two_minutes,
            blocked_until,
            methods,
        } = host_state;
        let method = methods.entry(family).or_insert_with(|| MethodState {
            bucket: Bucket::new(
                self.config.method_per_ten_seconds,
                Duration::from_secs(10),
                self.config.method_margin,
            ),
            blocked_until: None,
        });

        let mut wait = block_wait(blocked_until, now);
        wait = wait.max(block_wait(&mut method.blocked_until, now));
        wait = wait.max(per_second.wait(now));
        wait = wait.max(per_two_minutes.wait(now));
        wait = wait.max(method.bucket.wait(now));

        if wait.is_zero() {
            per_second.take();
            per_two_minutes.take();
            method.bucket.take();
            Ok(())
        } else {
            Err(wait)
        }
    }

    /// The shortest wait currently needed for the key, without consuming
    /// tokens. Zero means a call would be admitted right now.
    pub fn current_wait(&self, host: &str, family: MethodFamily) -> Duration {
        let now = Instant::now();
        let mut hosts = self.hosts.lock().unwrap();
        let Some(host_state) = hosts.get_mut(host) else {
            return Duration::ZERO;
        };

        let HostState {
            per_second,
            per_two_minutes,
            blocked_until,
            methods,
        } = host_state;

        let mut wait = block_wait(blocked_until, now);
        wait = wait.max(per_second.wait(now));
        wait = wait.max(per_two_minutes.wait(now));
        if let Some(method) = methods.get_mut(&family) {
            wait = wait.max(block_wait(&mut method.blocked_until, now));
            wait = wait.max(method.bucket.wait(now));
        }
        wait
    }

    /// Honors a server 429: the affected scope is forced empty until the
    /// absolute `Retry-After` deadline. Application and service scopes block
    /// the whole host; method scope blocks only the endpoint family.
    pub fn observe_rate_limited(
        &self,
        host: &str,
        family: MethodFamily,
        scope: RateLimitScope,
        retry_after: Option<Duration>,
    ) {
        let until = Instant::now() + retry_after.unwrap_or(DEFAULT_BLOCK);
        let mut hosts = self.hosts.lock().unwrap();
        let host_state = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(&self.config));

        match scope {
            RateLimitScope::App | RateLimitScope::Service => {
                host_state.blocked_until = Some(
                    host_state
                        .blocked_until
                        .map_or(until, |existing| existing.max(until)),
                );
            }
            RateLimitScope::Method => {
                let method =
                    host_state
                        .methods
                        .entry(family)
                        .or_insert_with(|| MethodState {
                            bucket: Bucket::new(
                                self.config.method_per_ten_seconds,
                                Duration::from_secs(10),
                                self.config.method_margin,
                            ),
                            blocked_until: None,
                        });
                method.blocked_until = Some(
                    method
                        .blocked_until
                        .map_or(until, |existing| existing.max(until)),
                );
            }
        }
    }

    fn gate(&self, host: &str, family: MethodFamily) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap();
        Arc::clone(
            gates
                .entry((host.to_string(), family))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "https://europe.api.riotgames.com";

    fn config() -> RateLimiterConfig {
        RateLimiterConfig {
            app_per_second: 20,
            app_per_two_minutes: 100,
            method_per_ten_seconds: 250,
            app_margin: 0.8,
            method_margin: 0.9,
        }
    }

    #[test]
    fn margins_shrink_capacity() {
        let bucket = Bucket::new(20, Duration::from_secs(1), 0.8);
        assert_eq!(bucket.capacity, 16);
        let bucket = Bucket::new(250, Duration::from_secs(10), 0.9);
        assert_eq!(bucket.capacity, 225);
        // Margin can never zero out a bucket.
        let bucket = Bucket::new(1, Duration::from_secs(1), 0.5);
        assert_eq!(bucket.capacity, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn admits_until_the_smallest_bucket_empties() {
        let limiter = RateLimiter::new(config());
        // 20 * 0.8 = 16 per-second tokens.
        for _ in 0..16 {
            assert!(limiter.try_acquire(HOST, MethodFamily::MatchById).is_ok());
        }
        let wait = limiter
            .try_acquire(HOST, MethodFamily::MatchById)
            .unwrap_err();
        assert!(wait > Duration::ZERO && wait <= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn per_second_bucket_refills_after_its_window() {
        let limiter = RateLimiter::new(config());
        for _ in 0..16 {
            limiter.try_acquire(HOST, MethodFamily::MatchById).unwrap();
        }
        assert!(limiter.try_acquire(HOST, MethodFamily::MatchById).is_err());

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(limiter.try_acquire(HOST, MethodFamily::MatchById).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn server_429_blocks_the_scope_until_retry_after() {
        let limiter = RateLimiter::new(config());
        limiter.observe_rate_limited(
            HOST,
            MethodFamily::MatchById,
            RateLimitScope::App,
            Some(Duration::from_secs(5)),
        );

        // The whole host is blocked, including other families.
        assert!(limiter.try_acquire(HOST, MethodFamily::MatchById).is_err());
        assert!(
            limiter
                .try_acquire(HOST, MethodFamily::AccountByPuuid)
                .is_err()
        );

        tokio::time::advance(Duration::from_millis(5100)).await;
        assert!(limiter.try_acquire(HOST, MethodFamily::MatchById).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn method_scope_blocks_only_its_family() {
        let limiter = RateLimiter::new(config());
        limiter.observe_rate_limited(
            HOST,
            MethodFamily::MatchById,
            RateLimitScope::Method,
            Some(Duration::from_secs(10)),
        );

        assert!(limiter.try_acquire(HOST, MethodFamily::MatchById).is_err());
        assert!(
            limiter
                .try_acquire(HOST, MethodFamily::AccountByPuuid)
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_within_yields_instead_of_waiting_out_a_block() {
        let limiter = RateLimiter::new(config());
        limiter.observe_rate_limited(
            HOST,
            MethodFamily::MatchById,
            RateLimitScope::App,
            Some(Duration::from_secs(30)),
        );

        let result = limiter
            .acquire_within(HOST, MethodFamily::MatchById, Duration::from_secs(2))
            .await;
        let outstanding = result.unwrap_err();
        assert!(outstanding > Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn different_hosts_do_not_share_buckets() {
        let limiter = RateLimiter::new(config());
        for _ in 0..16 {
            limiter.try_acquire(HOST, MethodFamily::MatchById).unwrap();
        }
        assert!(limiter.try_acquire(HOST, MethodFamily::MatchById).is_err());
        assert!(
            limiter
                .try_acquire(
                    "https://americas.api.riotgames.com",
                    MethodFamily::MatchById
                )
                .is_ok()
        );
    }
}
