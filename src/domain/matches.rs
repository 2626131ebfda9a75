use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::schema::matches;

/// Provider-assigned match identifier, e.g. `EUW1_7203984021`.
pub type MatchId = String;

/// Queue ids that count as ranked play.
pub const RANKED_SOLO_QUEUE: i32 = 420;
pub const RANKED_FLEX_QUEUE: i32 = 440;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = matches, primary_key(match_id), check_for_backend(diesel::pg::Pg))]
pub struct Match {
    pub match_id: MatchId,
    pub platform: String,
    pub queue_id: i32,
    pub game_mode: String,
    pub game_creation: DateTime<Utc>,
    pub game_duration_secs: i32,
    pub game_version: String,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = matches, check_for_backend(diesel::pg::Pg))]
pub struct NewMatch {
    pub match_id: MatchId,
    pub platform: String,
    pub queue_id: i32,
    pub game_mode: String,
    pub game_creation: DateTime<Utc>,
    pub game_duration_secs: i32,
    pub game_version: String,
    pub is_processed: bool,
}

/// Whether the match was played in a ranked queue.
pub fn is_ranked(m: &Match) -> bool {
    m.queue_id == RANKED_SOLO_QUEUE || m.queue_id == RANKED_FLEX_QUEUE
}

/// Game duration rendered as `mm:ss` (hours folded into minutes).
pub fn duration_formatted(m: &Match) -> String {
    let secs = m.game_duration_secs.max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Game length in fractional minutes, floored at one second to keep
/// per-minute rates finite.
pub fn duration_minutes(m: &Match) -> f64 {
    f64::from(m.game_duration_secs.max(1)) / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(queue_id: i32, duration: i32) -> Match {
        Match {
            match_id: "EUW1_1".to_string(),
            platform: "euw1".to_string(),
            queue_id,
            game_mode: "CLASSIC".to_string(),
            game_creation: Utc::now(),
            game_duration_secs: duration,
            game_version: "15.4.1".to_string(),
            is_processed: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ranked_queues_are_recognized() {
        assert!(is_ranked(&sample(RANKED_SOLO_QUEUE, 1800)));
        assert!(is_ranked(&sample(RANKED_FLEX_QUEUE, 1800)));
        assert!(!is_ranked(&sample(450, 1800)));
    }

    #[test]
    fn duration_formats_minutes_and_seconds() {
        assert_eq!(duration_formatted(&sample(420, 1865)), "31:05");
        assert_eq!(duration_formatted(&sample(420, 59)), "0:59");
    }

    #[test]
    fn duration_minutes_never_hits_zero() {
        assert!(duration_minutes(&sample(420, 0)) > 0.0);
    }
}
