use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::matches::{Match, duration_minutes};
use crate::schema::match_participants;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = match_participants, check_for_backend(diesel::pg::Pg))]
pub struct MatchParticipant {
    pub id: Uuid,
    pub match_id: String,
    pub puuid: String,
    pub champion_id: i32,
    pub champion_name: String,
    pub team_id: i32,
    pub win: bool,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub cs: i32,
    pub gold_earned: i32,
    pub damage_to_champions: i32,
    pub vision_score: i32,
    pub position: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = match_participants, check_for_backend(diesel::pg::Pg))]
pub struct NewMatchParticipant {
    pub match_id: String,
    pub puuid: String,
    pub champion_id: i32,
    pub champion_name: String,
    pub team_id: i32,
    pub win: bool,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub cs: i32,
    pub gold_earned: i32,
    pub damage_to_champions: i32,
    pub vision_score: i32,
    pub position: String,
}

/// Kills-plus-assists per death; a deathless game counts deaths as one.
pub fn kda_ratio(p: &MatchParticipant) -> f64 {
    f64::from(p.kills + p.assists) / f64::from(p.deaths.max(1))
}

/// Creep score per minute of game time.
pub fn cs_per_minute(p: &MatchParticipant, m: &Match) -> f64 {
    f64::from(p.cs) / duration_minutes(m)
}

/// Fraction of wins over the given window; 0.0 for an empty window.
pub fn win_rate(window: &[MatchParticipant]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let wins = window.iter().filter(|p| p.win).count();
    wins as f64 / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample(kills: i32, deaths: i32, assists: i32, win: bool) -> MatchParticipant {
        MatchParticipant {
            id: Uuid::new_v4(),
            match_id: "EUW1_1".to_string(),
            puuid: "puuid-1".to_string(),
            champion_id: 39,
            champion_name: "Irelia".to_string(),
            team_id: 100,
            win,
            kills,
            deaths,
            assists,
            cs: 200,
            gold_earned: 12_000,
            damage_to_champions: 24_000,
            vision_score: 18,
            position: "TOP".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn kda_counts_deathless_games_as_one_death() {
        assert_eq!(kda_ratio(&sample(10, 0, 5, true)), 15.0);
        assert_eq!(kda_ratio(&sample(6, 3, 3, true)), 3.0);
    }

    #[test]
    fn win_rate_over_window() {
        let window = vec![
            sample(1, 1, 1, true),
            sample(1, 1, 1, true),
            sample(1, 1, 1, false),
            sample(1, 1, 1, true),
        ];
        assert_eq!(win_rate(&window), 0.75);
        assert_eq!(win_rate(&[]), 0.0);
    }
}
