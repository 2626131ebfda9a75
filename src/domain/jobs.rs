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

use crate::schema::{job_configurations, job_executions};

/// Unique identifier type for job executions.
pub type ExecutionKey = Uuid;

/// Unique identifier type for job configurations.
pub type JobConfigKey = Uuid;

/// The four recurring jobs the core runs.
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
#[diesel(sql_type = crate::schema::sql_types::JobKind)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Keeps watched players, their ranks and recent matches current.
    TrackedPlayerUpdater,
    /// Expands match coverage for players discovered as teammates/opponents.
    MatchFetcher,
    /// Scores accumulated data; makes no external calls.
    PlayerAnalyzer,
    /// Probes flagged accounts for disappearance (ban heuristic).
    BanChecker,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::TrackedPlayerUpdater,
        JobKind::MatchFetcher,
        JobKind::PlayerAnalyzer,
        JobKind::BanChecker,
    ];
}

impl ToSql<crate::schema::sql_types::JobKind, Pg> for JobKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            JobKind::TrackedPlayerUpdater => out.write_all(b"tracked_player_updater")?,
            JobKind::MatchFetcher => out.write_all(b"match_fetcher")?,
            JobKind::PlayerAnalyzer => out.write_all(b"player_analyzer")?,
            JobKind::BanChecker => out.write_all(b"ban_checker")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::JobKind, Pg> for JobKind {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"tracked_player_updater" => Ok(JobKind::TrackedPlayerUpdater),
            b"match_fetcher" => Ok(JobKind::MatchFetcher),
            b"player_analyzer" => Ok(JobKind::PlayerAnalyzer),
            b"ban_checker" => Ok(JobKind::BanChecker),
            _ => {
                let unrecognized_value = String::from_utf8_lossy(bytes.as_bytes());
                Err(format!("Unrecognized enum variant: {}", unrecognized_value).into())
            }
        }
    }
}

/// Lifecycle state of a single execution. Every run that leaves `Pending`
/// terminates in one of the four terminal states with a finished timestamp.
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
#[diesel(sql_type = crate::schema::sql_types::ExecutionStatus)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    RateLimited,
    Skipped,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

impl ToSql<crate::schema::sql_types::ExecutionStatus, Pg> for ExecutionStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match *self {
            ExecutionStatus::Pending => out.write_all(b"pending")?,
            ExecutionStatus::Running => out.write_all(b"running")?,
            ExecutionStatus::Success => out.write_all(b"success")?,
            ExecutionStatus::Failed => out.write_all(b"failed")?,
            ExecutionStatus::RateLimited => out.write_all(b"rate_limited")?,
            ExecutionStatus::Skipped => out.write_all(b"skipped")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<crate::schema::sql_types::ExecutionStatus, Pg> for ExecutionStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(ExecutionStatus::Pending),
            b"running" => Ok(ExecutionStatus::Running),
            b"success" => Ok(ExecutionStatus::Success),
            b"failed" => Ok(ExecutionStatus::Failed),
            b"rate_limited" => Ok(ExecutionStatus::RateLimited),
            b"skipped" => Ok(ExecutionStatus::Skipped),
            _ => {
                let unrecognized_value = String::from_utf8_lossy(bytes.as_bytes());
                Err(format!("Unrecognized enum variant: {}", unrecognized_value).into())
            }
        }
    }
}

/// One row per job kind; operators edit schedule, enablement and tunables.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = job_configurations, check_for_backend(diesel::pg::Pg))]
pub struct JobConfiguration {
    pub id: JobConfigKey,
    pub job_type: JobKind,
    pub display_name: String,
    pub schedule: String,
    pub is_active: bool,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobConfiguration {
    /// Parses the tunables blob, falling back to defaults for absent keys.
    pub fn tunables(&self) -> JobTunables {
        serde_json::from_value(self.settings.clone()).unwrap_or_default()
    }
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = job_configurations, check_for_backend(diesel::pg::Pg))]
pub struct NewJobConfiguration {
    pub job_type: JobKind,
    pub display_name: String,
    pub schedule: String,
    pub is_active: bool,
    pub settings: serde_json::Value,
}

/// Per-job tunables carried in the configuration JSON blob. Every key has a
/// default so partial blobs stay valid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct JobTunables {
    pub max_tracked_players_per_run: i64,
    pub max_new_matches_per_player: i64,
    pub matches_per_player_per_run: i64,
    pub target_matches_per_player: i64,
    pub minimum_games_for_analysis: i64,
    /// Hours after which an existing analysis is considered stale.
    pub reanalysis_age: i64,
    pub ban_check_days: i64,
    pub job_timeout_seconds: u64,
    pub per_job_concurrency: usize,
}

impl Default for JobTunables {
    fn default() -> Self {
        Self {
            max_tracked_players_per_run: 25,
            max_new_matches_per_player: 10,
            matches_per_player_per_run: 5,
            target_matches_per_player: 20,
            minimum_games_for_analysis: 10,
            reanalysis_age: 24,
            ban_check_days: 7,
            job_timeout_seconds: 600,
            per_job_concurrency: 4,
        }
    }
}

/// Append-only ledger row for one run of one job.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = job_executions, check_for_backend(diesel::pg::Pg))]
pub struct JobExecution {
    pub id: ExecutionKey,
    pub job_configuration_id: JobConfigKey,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<serde_json::Value>,
    pub log: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = job_executions, check_for_backend(diesel::pg::Pg))]
pub struct NewJobExecution {
    pub job_configuration_id: JobConfigKey,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
}

/// Structured outcome of a run, persisted as the execution summary.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub players_processed: u32,
    pub players_updated: u32,
    pub players_failed: u32,
    pub matches_ingested: u32,
    pub analyses_stored: u32,
    pub bans_detected: u32,
    pub stale_served: u32,
    /// Set when the run yielded partway to the rate limiter; the runner
    /// classifies such a summary as a `rate_limited` execution.
    pub rate_limited: bool,
    /// Set when a per-run cap cut the working set short.
    pub cap_reached: bool,
}

impl RunSummary {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunables_default_for_empty_blob() {
        let cfg = JobConfiguration {
            id: Uuid::new_v4(),
            job_type: JobKind::TrackedPlayerUpdater,
            display_name: "Tracked player updater".to_string(),
            schedule: "@every 15m".to_string(),
            is_active: true,
            settings: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(cfg.tunables(), JobTunables::default());
    }

    #[test]
    fn tunables_merge_partial_blobs() {
        let cfg = JobConfiguration {
            id: Uuid::new_v4(),
            job_type: JobKind::MatchFetcher,
            display_name: "Match fetcher".to_string(),
            schedule: "@every 30m".to_string(),
            is_active: true,
            settings: serde_json::json!({"matches_per_player_per_run": 9}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let tunables = cfg.tunables();
        assert_eq!(tunables.matches_per_player_per_run, 9);
        assert_eq!(
            tunables.target_matches_per_player,
            JobTunables::default().target_matches_per_player
        );
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::RateLimited.is_terminal());
        assert!(ExecutionStatus::Skipped.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
    }
}
