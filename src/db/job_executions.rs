//! Database access layer for the job execution ledger.
//!
//! Executions are append-only apart from the single transition out of
//! `running`; a partial unique index in the schema guarantees at most one
//! running execution per configuration.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::DbConn;
use crate::domain::error::Result;
use crate::domain::jobs::{
	ExecutionKey, ExecutionStatus, JobConfigKey, JobExecution, NewJobExecution,
};
use crate::schema::job_executions::dsl::*;

/// Inserts a ledger row in `running` state and returns it.
pub fn insert_running(conn: &mut DbConn, config_id: JobConfigKey) -> Result<JobExecution> {
	let execution = diesel::insert_into(job_executions)
		.values(NewJobExecution {
			job_configuration_id: config_id,
			status: ExecutionStatus::Running,
			started_at: Utc::now(),
		})
		.returning(JobExecution::as_returning())
		.get_result(conn)?;
	Ok(execution)
}

/// Records a fire that was rejected because a run was already in flight.
pub fn insert_skipped(conn: &mut DbConn, config_id: JobConfigKey) -> Result<JobExecution> {
	let now = Utc::now();
	let execution = diesel::insert_into(job_executions)
		.values((
			job_configuration_id.eq(config_id),
			status.eq(ExecutionStatus::Skipped),
			started_at.eq(now),
			finished_at.eq(Some(now)),
		))
		.returning(JobExecution::as_returning())
		.get_result(conn)?;
	Ok(execution)
}

/// Final transition of a run: terminal status, captured log, summary and
/// error message land in one write together with the finished timestamp.
pub fn finish(
	conn: &mut DbConn,
	execution_id: &ExecutionKey,
	final_status: ExecutionStatus,
	run_summary: Option<serde_json::Value>,
	captured_log: Option<String>,
	error: Option<String>,
) -> Result<JobExecution> {
	debug_assert!(final_status.is_terminal());
	let execution = diesel::update(job_executions.find(execution_id))
		.set((
			status.eq(final_status),
			finished_at.eq(Some(Utc::now())),
			summary.eq(run_summary),
			log.eq(captured_log),
			error_message.eq(error),
		))
		.returning(JobExecution::as_returning())
		.get_result(conn)?;
	Ok(execution)
}

/// Retrieves one execution with its captured log blob.
pub fn get(conn: &mut DbConn, execution_id: &ExecutionKey) -> Result<Option<JobExecution>> {
	let execution: Option<JobExecution> =
		job_executions.find(execution_id).first(conn).optional()?;
	Ok(execution)
}

/// Whether any execution for the configuration is currently `running`.
pub fn running_exists(conn: &mut DbConn, config_id: &JobConfigKey) -> Result<bool> {
	let found: Option<ExecutionKey> = job_executions
		.filter(job_configuration_id.eq(config_id))
		.filter(status.eq(ExecutionStatus::Running))
		.select(id)
		.first(conn)
		.optional()?;
	Ok(found.is_some())
}

/// Recent executions for one configuration, newest first, paged.
pub fn list_recent(
	conn: &mut DbConn,
	config_id: &JobConfigKey,
	page_size: i64,
	offset: i64,
) -> Result<Vec<JobExecution>> {
	let executions = job_executions
		.filter(job_configuration_id.eq(config_id))
		.order(started_at.desc())
		.limit(page_size)
		.offset(offset)
		.select(JobExecution::as_select())
		.load(conn)?;
	Ok(executions)
}

/// Executions still `running` despite their process having gone away; used
/// at startup and shutdown to close the ledger honestly.
pub fn close_orphaned(conn: &mut DbConn, marker: &str) -> Result<usize> {
	let closed = diesel::update(job_executions.filter(status.eq(ExecutionStatus::Running)))
		.set((
			status.eq(ExecutionStatus::Failed),
			finished_at.eq(Some(Utc::now())),
			error_message.eq(Some(marker)),
		))
		.execute(conn)?;
	Ok(closed)
}

/// Executions started inside the window, any configuration, newest first.
pub fn list_window(
	conn: &mut DbConn,
	since: DateTime<Utc>,
) -> Result<Vec<JobExecution>> {
	let executions = job_executions
		.filter(started_at.ge(since))
		.order(started_at.desc())
		.select(JobExecution::as_select())
		.load(conn)?;
	Ok(executions)
}
