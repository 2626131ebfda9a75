use chrono::{DateTime, Utc};
use diesel::prelude::*;
use strum_macros::{Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::schema::player_ranks;

/// Queue type strings as the provider reports them.
pub const RANKED_SOLO: &str = "RANKED_SOLO_5x5";
pub const RANKED_FLEX: &str = "RANKED_FLEX_SR";

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = player_ranks, check_for_backend(diesel::pg::Pg))]
pub struct PlayerRank {
    pub id: Uuid,
    pub puuid: String,
    pub queue_type: String,
    pub tier: String,
    pub division: String,
    pub league_points: i32,
    pub wins: i32,
    pub losses: i32,
    pub hot_streak: bool,
    pub is_current: bool,
    pub fetched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = player_ranks, check_for_backend(diesel::pg::Pg))]
pub struct NewPlayerRank {
    pub puuid: String,
    pub queue_type: String,
    pub tier: String,
    pub division: String,
    pub league_points: i32,
    pub wins: i32,
    pub losses: i32,
    pub hot_streak: bool,
    pub is_current: bool,
    pub fetched_at: DateTime<Utc>,
}

/// Competitive tiers, lowest first. The discriminant order is load-bearing
/// for rank-discrepancy scoring.
#[derive(
    Debug, Display, EnumString, EnumIter, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Tier {
    Iron,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Emerald,
    Diamond,
    Master,
    Grandmaster,
    Challenger,
}

impl Tier {
    /// Zero-based ladder index (Iron = 0, Challenger = 9).
    pub fn ladder_index(self) -> u8 {
        self as u8
    }
}

/// Sub-rank within a tier, IV (lowest) through I.
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Division {
    IV,
    III,
    II,
    I,
}

impl Division {
    /// Zero-based step within the tier (IV = 0, I = 3).
    pub fn step(self) -> u8 {
        self as u8
    }
}

impl PlayerRank {
    /// Parsed tier, if the stored string is a known tier name.
    pub fn tier_parsed(&self) -> Option<Tier> {
        self.tier.parse().ok()
    }

    /// Absolute ladder position combining tier and division, in division
    /// steps. Apex tiers have no divisions and sit above Diamond I.
    pub fn ladder_steps(&self) -> Option<u32> {
        let tier = self.tier_parsed()?;
        let step = match tier {
            Tier::Master | Tier::Grandmaster | Tier::Challenger => 0,
            _ => self.division.parse::<Division>().ok()?.step() as u32,
        };
        Some(u32::from(tier.ladder_index()) * 4 + step)
    }

    /// Lifetime ranked win rate for this queue entry; 0.0 with no games.
    pub fn season_win_rate(&self) -> f64 {
        let games = self.wins + self.losses;
        if games <= 0 {
            return 0.0;
        }
        f64::from(self.wins) / f64::from(games)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(tier: &str, division: &str, wins: i32, losses: i32) -> PlayerRank {
        PlayerRank {
            id: Uuid::new_v4(),
            puuid: "puuid-1".to_string(),
            queue_type: RANKED_SOLO.to_string(),
            tier: tier.to_string(),
            division: division.to_string(),
            league_points: 55,
            wins,
            losses,
            hot_streak: false,
            is_current: true,
            fetched_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tiers_order_from_iron_to_challenger() {
        assert!(Tier::Iron < Tier::Gold);
        assert!(Tier::Diamond < Tier::Challenger);
        assert_eq!(Tier::Iron.ladder_index(), 0);
        assert_eq!(Tier::Challenger.ladder_index(), 9);
    }

    #[test]
    fn ladder_steps_combine_tier_and_division() {
        assert_eq!(rank("IRON", "IV", 0, 0).ladder_steps(), Some(0));
        assert_eq!(rank("GOLD", "II", 0, 0).ladder_steps(), Some(14));
        // Apex tiers carry a placeholder division.
        assert_eq!(rank("MASTER", "I", 0, 0).ladder_steps(), Some(28));
    }

    #[test]
    fn unknown_tier_strings_parse_to_none() {
        assert_eq!(rank("WOOD", "IV", 0, 0).ladder_steps(), None);
    }

    #[test]
    fn season_win_rate_handles_empty_records() {
        assert_eq!(rank("GOLD", "I", 0, 0).season_win_rate(), 0.0);
        assert_eq!(rank("GOLD", "I", 60, 40).season_win_rate(), 0.6);
    }
}
