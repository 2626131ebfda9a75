pub mod client;
pub mod dto;
pub mod rate_limiter;
pub mod routing;

use std::time::Duration;

use secrecy::SecretString;

pub use client::RiotClient;
pub use rate_limiter::{RateLimiter, RateLimiterConfig};

use crate::configuration::RiotSettings;

/// Source of the active external API key. Looked up on every call so a
/// rotated key takes effect without restart.
pub trait ApiKeyProvider: Send + Sync {
    fn api_key(&self) -> Option<SecretString>;
}

/// Key provider backed by the loaded configuration.
pub struct ConfigApiKey {
    key: Option<SecretString>,
}

impl ConfigApiKey {
    pub fn new(key: Option<SecretString>) -> Self {
        Self { key }
    }
}

impl From<&RiotSettings> for ConfigApiKey {
    fn from(settings: &RiotSettings) -> Self {
        Self {
            key: settings.api_key.clone(),
        }
    }
}

impl ApiKeyProvider for ConfigApiKey {
    fn api_key(&self) -> Option<SecretString> {
        self.key.clone()
    }
}

/// Discriminated outcome of one external API operation. Rate limiting and
/// upstream absence are values, not errors; the data manager converts them
/// into freshness decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiOutcome<T> {
    Found(T),
    NotFound,
    RateLimited { retry_after: Option<Duration> },
    /// 5xx or network failure that survived every retry attempt.
    Transient { status: Option<u16> },
    /// Unexpected 4xx or a body that failed validation.
    Fatal { status: u16, message: String },
}

impl<T> ApiOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            ApiOutcome::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiOutcome::RateLimited { .. })
    }
}
