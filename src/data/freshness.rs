//! Per-kind freshness policy the data manager consults before going
//! external.

use chrono::Duration;

use crate::configuration::FreshnessSettings;
use crate::domain::tracking::DataKind;

/// How a served entity relates to the freshness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Inside its TTL, or just fetched.
    Fresh,
    /// TTL expired and the refresh could not run; cached row served with a
    /// warning flag.
    StaleServed,
    /// Nothing cached and the refresh was rate limited.
    MissingRateLimited,
}

#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    settings: FreshnessSettings,
}

impl FreshnessPolicy {
    pub fn new(settings: FreshnessSettings) -> Self {
        Self { settings }
    }

    /// TTL for an entity kind. `None` means the entity never goes stale
    /// (completed matches are immutable). A zero TTL means the kind is never
    /// cached (active games are inherently live).
    pub fn ttl(&self, kind: DataKind) -> Option<Duration> {
        match kind {
            DataKind::Account => Some(Duration::hours(self.settings.account_hours)),
            DataKind::Summoner => Some(Duration::hours(self.settings.summoner_hours)),
            DataKind::Match => None,
            DataKind::MatchIds => Some(Duration::minutes(self.settings.match_ids_minutes)),
            DataKind::Rank => Some(Duration::hours(self.settings.rank_hours)),
            DataKind::ActiveGame => Some(Duration::zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_policy_table() {
        let policy = FreshnessPolicy::new(FreshnessSettings::default());
        assert_eq!(policy.ttl(DataKind::Account), Some(Duration::hours(24)));
        assert_eq!(policy.ttl(DataKind::MatchIds), Some(Duration::minutes(5)));
        assert_eq!(policy.ttl(DataKind::Rank), Some(Duration::hours(1)));
        assert_eq!(policy.ttl(DataKind::Match), None);
        assert_eq!(policy.ttl(DataKind::ActiveGame), Some(Duration::zero()));
    }
}
