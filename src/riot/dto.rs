//! Typed response shapes for the external game API.
//!
//! Unknown fields are tolerated everywhere; a required field missing makes
//! the response unparseable and the client classifies it as fatal. Provider
//! timestamps arrive as milliseconds since epoch and are converted at this
//! boundary.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub puuid: String,
    pub game_name: String,
    pub tag_line: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummonerDto {
    pub puuid: String,
    #[serde(default)]
    pub id: Option<String>,
    pub summoner_level: i64,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeagueEntryDto {
    pub queue_type: String,
    pub tier: String,
    #[serde(default)]
    pub rank: Option<String>,
    pub league_points: i32,
    pub wins: i32,
    pub losses: i32,
    #[serde(default)]
    pub hot_streak: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchDto {
    pub metadata: MatchMetadataDto,
    pub info: MatchInfoDto,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadataDto {
    pub match_id: String,
    /// Participant puuids; identity with `info.participants` is by index.
    pub participants: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfoDto {
    /// Milliseconds since epoch.
    pub game_creation: i64,
    /// Seconds for post-patch-11.20 matches.
    pub game_duration: i64,
    pub game_mode: String,
    pub game_version: String,
    pub queue_id: i32,
    pub platform_id: String,
    pub participants: Vec<ParticipantDto>,
}

impl MatchInfoDto {
    pub fn game_creation_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.game_creation).unwrap_or_default()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub puuid: String,
    pub champion_id: i32,
    #[serde(default)]
    pub champion_name: String,
    pub team_id: i32,
    pub win: bool,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    #[serde(default)]
    pub total_minions_killed: i32,
    #[serde(default)]
    pub neutral_minions_killed: i32,
    #[serde(default)]
    pub gold_earned: i32,
    #[serde(default)]
    pub total_damage_dealt_to_champions: i32,
    #[serde(default)]
    pub vision_score: i32,
    #[serde(default)]
    pub team_position: String,
}

impl ParticipantDto {
    /// Lane plus jungle creeps, the CS figure shown in game.
    pub fn creep_score(&self) -> i32 {
        self.total_minions_killed + self.neutral_minions_killed
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGameDto {
    pub game_id: i64,
    pub game_mode: String,
    #[serde(default)]
    pub game_length: i64,
    #[serde(default)]
    pub participants: Vec<CurrentGameParticipantDto>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGameParticipantDto {
    pub puuid: String,
    pub champion_id: i64,
    pub team_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_tolerated() {
        let body = serde_json::json!({
            "puuid": "abc",
            "gameName": "Faker",
            "tagLine": "KR1",
            "someFutureField": 42,
        });
        let dto: AccountDto = serde_json::from_value(body).unwrap();
        assert_eq!(dto.game_name, "Faker");
    }

    #[test]
    fn missing_required_fields_fail_to_parse() {
        let body = serde_json::json!({"puuid": "abc", "gameName": "Faker"});
        assert!(serde_json::from_value::<AccountDto>(body).is_err());
    }

    #[test]
    fn game_creation_converts_from_millis() {
        let info = MatchInfoDto {
            game_creation: 1_700_000_000_000,
            game_duration: 1800,
            game_mode: "CLASSIC".to_string(),
            game_version: "15.4.1".to_string(),
            queue_id: 420,
            platform_id: "EUW1".to_string(),
            participants: vec![],
        };
        assert_eq!(info.game_creation_utc().timestamp(), 1_700_000_000);
    }

    #[test]
    fn creep_score_sums_lane_and_jungle() {
        let body = serde_json::json!({
            "puuid": "abc",
            "championId": 64,
            "championName": "LeeSin",
            "teamId": 100,
            "win": true,
            "kills": 5, "deaths": 2, "assists": 9,
            "totalMinionsKilled": 40,
            "neutralMinionsKilled": 140,
        });
        let dto: ParticipantDto = serde_json::from_value(body).unwrap();
        assert_eq!(dto.creep_score(), 180);
    }
}
