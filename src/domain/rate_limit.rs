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

use crate::schema::rate_limit_log;

/// Which limit family a throttling event belongs to.
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
)]
#[diesel(sql_type = crate::schema::sql_types::RateLimitScope)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    App,
    Method,
    Service,
}

impl ToSql<crate::schema::sql_types::RateLimitScope, Pg> for RateLimitScope {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            RateLimitScope::App => out.write_all(b"app")?,
            RateLimitScope::Method => out.write_all(b"method")?,
            RateLimitScope::Service => out.write_all(b"service")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::RateLimitScope, Pg> for RateLimitScope {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"app" => Ok(RateLimitScope::App),
            b"method" => Ok(RateLimitScope::Method),
            b"service" => Ok(RateLimitScope::Service),
            _ => {
                let unrecognized_value = String::from_utf8_lossy(bytes.as_bytes());
                Err(format!("Unrecognized enum variant: {}", unrecognized_value).into())
            }
        }
    }
}

/// Append-only record of a throttling event observed against the external API.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = rate_limit_log, check_for_backend(diesel::pg::Pg))]
pub struct RateLimitEvent {
    pub id: Uuid,
    pub scope: RateLimitScope,
    pub endpoint: String,
    pub limit_value: Option<i32>,
    pub observed: Option<i32>,
    pub retry_after_secs: Option<i32>,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = rate_limit_log, check_for_backend(diesel::pg::Pg))]
pub struct NewRateLimitEvent {
    pub scope: RateLimitScope,
    pub endpoint: String,
    pub limit_value: Option<i32>,
    pub observed: Option<i32>,
    pub retry_after_secs: Option<i32>,
    pub context: Option<String>,
}
