use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::schema::players;

/// Opaque, globally unique player identifier assigned by the game platform.
/// Primary player key throughout the core.
pub type Puuid = String;

#[derive(Queryable, QueryableByName, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = players, primary_key(puuid), check_for_backend(diesel::pg::Pg))]
pub struct Player {
    pub puuid: Puuid,
    pub game_name: String,
    pub tag_line: String,
    pub platform: String,
    pub summoner_id: Option<String>,
    pub summoner_level: i32,
    pub is_tracked: bool,
    pub is_analyzed: bool,
    pub is_active: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_ban_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Player {
    /// Human-visible `name#tag` form of the account.
    pub fn riot_id(&self) -> String {
        format!("{}#{}", self.game_name, self.tag_line)
    }
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = players, check_for_backend(diesel::pg::Pg))]
pub struct NewPlayer {
    pub puuid: Puuid,
    pub game_name: String,
    pub tag_line: String,
    pub platform: String,
    pub summoner_id: Option<String>,
    pub summoner_level: i32,
    pub is_tracked: bool,
}

#[derive(AsChangeset, Identifiable, Debug, Clone, Default, PartialEq, Eq)]
#[diesel(table_name = players, primary_key(puuid), check_for_backend(diesel::pg::Pg))]
pub struct UpdatePlayer {
    pub puuid: Puuid,
    pub game_name: Option<String>,
    pub tag_line: Option<String>,
    pub summoner_id: Option<String>,
    pub summoner_level: Option<i32>,
    pub is_tracked: Option<bool>,
    pub is_analyzed: Option<bool>,
    pub is_active: Option<bool>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_ban_check: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
