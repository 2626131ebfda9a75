use std::io::Write;

use chrono::{DateTime, Utc};
use derive_more::Display;
use diesel::deserialize::FromSql;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{IsNull, Output, ToSql};
use diesel::{AsExpression, FromSqlRow, deserialize, serialize};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::data_tracking;

/// Entity kinds the data manager tracks freshness for.
#[derive(
    AsExpression,
    FromSqlRow,
    Serialize,
    Deserialize,
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[diesel(sql_type = crate::schema::sql_types::DataKind)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Account,
    Summoner,
    Match,
    MatchIds,
    Rank,
    ActiveGame,
}

impl ToSql<crate::schema::sql_types::DataKind, Pg> for DataKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            DataKind::Account => out.write_all(b"account")?,
            DataKind::Summoner => out.write_all(b"summoner")?,
            DataKind::Match => out.write_all(b"match")?,
            DataKind::MatchIds => out.write_all(b"match_ids")?,
            DataKind::Rank => out.write_all(b"rank")?,
            DataKind::ActiveGame => out.write_all(b"active_game")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::DataKind, Pg> for DataKind {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"account" => Ok(DataKind::Account),
            b"summoner" => Ok(DataKind::Summoner),
            b"match" => Ok(DataKind::Match),
            b"match_ids" => Ok(DataKind::MatchIds),
            b"rank" => Ok(DataKind::Rank),
            b"active_game" => Ok(DataKind::ActiveGame),
            _ => {
                let unrecognized_value = String::from_utf8_lossy(bytes.as_bytes());
                Err(format!("Unrecognized enum variant: {}", unrecognized_value).into())
            }
        }
    }
}

/// Per-(kind, identifier) bookkeeping the freshness policy runs on.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = data_tracking, check_for_backend(diesel::pg::Pg))]
pub struct DataTracking {
    pub id: Uuid,
    pub data_type: DataKind,
    pub identifier: String,
    pub last_fetched: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub fetch_count: i32,
    pub hit_count: i32,
    /// Tombstone: the external API answered 404 for this identifier.
    pub not_found: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataTracking {
    /// Whether the tracked record is still inside the given TTL.
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.last_fetched {
            Some(fetched) => now - fetched <= ttl,
            None => false,
        }
    }
}
