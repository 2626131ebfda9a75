use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::Result;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub riot: RiotSettings,
    #[serde(default)]
    pub freshness: FreshnessSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: SecretString,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub pool_size: Option<u32>,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> SecretString {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.database_name
        )
        .into()
    }
}

/// External API client settings. The key may be absent; the client then
/// refuses every outbound call until one is configured.
#[derive(serde::Deserialize, Clone)]
pub struct RiotSettings {
    pub api_key: Option<SecretString>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Fraction of the published application limit the local buckets target.
    #[serde(default = "default_app_margin")]
    pub app_limit_margin: f64,
    /// Fraction of the published method limit the local buckets target.
    #[serde(default = "default_method_margin")]
    pub method_limit_margin: f64,
    #[serde(default = "default_app_per_second")]
    pub app_limit_per_second: u32,
    #[serde(default = "default_app_per_two_minutes")]
    pub app_limit_per_two_minutes: u32,
    #[serde(default = "default_method_per_ten_seconds")]
    pub method_limit_per_ten_seconds: u32,
}

impl Default for RiotSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            request_timeout_seconds: default_request_timeout(),
            retry_attempts: default_retry_attempts(),
            app_limit_margin: default_app_margin(),
            method_limit_margin: default_method_margin(),
            app_limit_per_second: default_app_per_second(),
            app_limit_per_two_minutes: default_app_per_two_minutes(),
            method_limit_per_ten_seconds: default_method_per_ten_seconds(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_app_margin() -> f64 {
    0.8
}

fn default_method_margin() -> f64 {
    0.9
}

fn default_app_per_second() -> u32 {
    20
}

fn default_app_per_two_minutes() -> u32 {
    100
}

fn default_method_per_ten_seconds() -> u32 {
    250
}

/// Per-kind freshness TTL overrides. Completed matches are immutable and
/// carry no TTL; active games are never cached.
#[derive(serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FreshnessSettings {
    pub account_hours: i64,
    pub summoner_hours: i64,
    pub match_ids_minutes: i64,
    pub rank_hours: i64,
}

impl Default for FreshnessSettings {
    fn default() -> Self {
        Self {
            account_hours: 24,
            summoner_hours: 24,
            match_ids_minutes: 5,
            rank_hours: 1,
        }
    }
}

#[derive(serde::Deserialize, Clone)]
#[serde(default)]
pub struct ScoringSettings {
    /// How many recent matches one analysis consumes.
    pub analysis_window: usize,
    /// Version string stored with every result so algorithm changes stay
    /// distinguishable.
    pub analysis_version: String,
    /// Optional weight overrides by factor name; must still sum to 1.0.
    pub weights: Option<BTreeMap<String, f64>>,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            analysis_window: 25,
            analysis_version: "smurf-v2".to_string(),
            weights: None,
        }
    }
}

#[derive(serde::Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerSettings {
    /// How long shutdown waits for in-flight executions before cancelling.
    pub shutdown_grace_seconds: u64,
    /// How long a data-manager read will wait on the rate limiter before
    /// degrading to a stale or missing answer.
    pub admission_wait_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            shutdown_grace_seconds: 30,
            admission_wait_seconds: 2,
        }
    }
}

pub fn get_settings() -> Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::new(
            "configuration.yaml",
            config::FileFormat::Yaml,
        ))
        .add_source(
            config::Environment::with_prefix("RIFTGUARD")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    Ok(settings.try_deserialize::<Settings>()?)
}
