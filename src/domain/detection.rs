use std::io::Write;

use chrono::{DateTime, Utc};
use diesel::deserialize::FromSql;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{IsNull, Output, ToSql};
use diesel::{AsExpression, FromSqlRow, deserialize, serialize};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::smurf_detections;

/// Confidence bucket derived from the overall score.
///
/// Thresholds: `>= 0.80` high, `>= 0.60` medium, `>= 0.40` low, else unlikely.
#[derive(
    AsExpression,
    FromSqlRow,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[diesel(sql_type = crate::schema::sql_types::ConfidenceLevel)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Unlikely,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Buckets an overall score per the fixed thresholds.
    pub fn from_score(score: f64) -> Confidence {
        if score >= 0.80 {
            Confidence::High
        } else if score >= 0.60 {
            Confidence::Medium
        } else if score >= 0.40 {
            Confidence::Low
        } else {
            Confidence::Unlikely
        }
    }

    /// Buckets that operationally classify a player as a smurf. The ban
    /// checker's working set is narrower (high only); see its query.
    pub fn is_flagged(self) -> bool {
        matches!(self, Confidence::High | Confidence::Medium)
    }
}

impl ToSql<crate::schema::sql_types::ConfidenceLevel, Pg> for Confidence {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            Confidence::Unlikely => out.write_all(b"unlikely")?,
            Confidence::Low => out.write_all(b"low")?,
            Confidence::Medium => out.write_all(b"medium")?,
            Confidence::High => out.write_all(b"high")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::ConfidenceLevel, Pg> for Confidence {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"unlikely" => Ok(Confidence::Unlikely),
            b"low" => Ok(Confidence::Low),
            b"medium" => Ok(Confidence::Medium),
            b"high" => Ok(Confidence::High),
            _ => {
                let unrecognized_value = String::from_utf8_lossy(bytes.as_bytes());
                Err(format!("Unrecognized enum variant: {}", unrecognized_value).into())
            }
        }
    }
}

/// One analysis run for one player. Append-only; the latest row per puuid is
/// the current verdict.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = smurf_detections, check_for_backend(diesel::pg::Pg))]
pub struct SmurfDetection {
    pub id: Uuid,
    pub puuid: String,
    pub overall_score: f64,
    pub factor_scores: serde_json::Value,
    pub confidence: Confidence,
    pub games_analyzed: i32,
    pub queue_id: Option<i32>,
    pub analysis_version: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = smurf_detections, check_for_backend(diesel::pg::Pg))]
pub struct NewSmurfDetection {
    pub puuid: String,
    pub overall_score: f64,
    pub factor_scores: serde_json::Value,
    pub confidence: Confidence,
    pub games_analyzed: i32,
    pub queue_id: Option<i32>,
    pub analysis_version: String,
}
