use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use super::{parse_timestamp, DbPool, RepoError};
use crate::model::{Job, JobId, JobStatus, UserId, WorkflowId};

/// Shadow of [`Job`] shaped for `sqlx::FromRow`; IDs and timestamps are
/// plain `TEXT`, matching `0001_init.sql`. Conversions mirror the
/// `CloudComponentOwner`/`CloudComponentOwnerRow` seam in
/// `cloud-common/src/repo/component.rs`.
#[derive(sqlx::FromRow, Debug, Clone)]
struct JobRow {
    id: String,
    user_id: String,
    workflow_id: String,
    mode: String,
    inputs: String,
    files: String,
    prepared_workflow: Option<String>,
    status: String,
    result: Option<String>,
    error_message: Option<String>,
    created_at: String,
}

impl TryFrom<JobRow> for Job {
    type Error = RepoError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId(uuid::Uuid::parse_str(&row.id).map_err(|e| RepoError::Malformed(e.to_string()))?),
            user_id: UserId(
                uuid::Uuid::parse_str(&row.user_id).map_err(|e| RepoError::Malformed(e.to_string()))?,
            ),
            workflow_id: WorkflowId(
                uuid::Uuid::parse_str(&row.workflow_id).map_err(|e| RepoError::Malformed(e.to_string()))?,
            ),
            mode: row.mode,
            inputs: serde_json::from_str(&row.inputs).map_err(|e| RepoError::Malformed(e.to_string()))?,
            files: serde_json::from_str(&row.files).map_err(|e| RepoError::Malformed(e.to_string()))?,
            prepared_workflow: row
                .prepared_workflow
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| RepoError::Malformed(e.to_string()))?,
            status: JobStatus::from_str(&row.status).map_err(RepoError::Malformed)?,
            result: row
                .result
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| RepoError::Malformed(e.to_string()))?,
            error_message: row.error_message,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(Clone)]
pub struct JobRepo {
    pool: DbPool,
}

impl JobRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: UserId,
        workflow_id: WorkflowId,
        mode: String,
        inputs: Value,
        files: HashMap<String, String>,
    ) -> Result<Job, RepoError> {
        let job = Job {
            id: JobId::new_v4(),
            user_id,
            workflow_id,
            mode,
            inputs,
            files,
            prepared_workflow: None,
            status: JobStatus::Queued,
            result: None,
            error_message: None,
            created_at: Utc::now(),
        };

        let sql = "INSERT INTO jobs (id, user_id, workflow_id, mode, inputs, files, \
                    prepared_workflow, status, result, error_message, created_at) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";
        let inputs_json = serde_json::to_string(&job.inputs).map_err(|e| RepoError::Malformed(e.to_string()))?;
        let files_json = serde_json::to_string(&job.files).map_err(|e| RepoError::Malformed(e.to_string()))?;

        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql)
                    .bind(job.id.0.to_string())
                    .bind(job.user_id.0.to_string())
                    .bind(job.workflow_id.0.to_string())
                    .bind(&job.mode)
                    .bind(&inputs_json)
                    .bind(&files_json)
                    .bind(Option::<String>::None)
                    .bind(job.status.as_str())
                    .bind(Option::<String>::None)
                    .bind(Option::<String>::None)
                    .bind(job.created_at.to_rfc3339())
                    .execute(pool)
                    .await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(job.id.0.to_string())
                    .bind(job.user_id.0.to_string())
                    .bind(job.workflow_id.0.to_string())
                    .bind(&job.mode)
                    .bind(&inputs_json)
                    .bind(&files_json)
                    .bind(Option::<String>::None)
                    .bind(job.status.as_str())
                    .bind(Option::<String>::None)
                    .bind(Option::<String>::None)
                    .bind(job.created_at.to_rfc3339())
                    .execute(pool)
                    .await?;
            }
        }

        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job>, RepoError> {
        let sql = "SELECT * FROM jobs WHERE id = $1";
        let row: Option<JobRow> = match &self.pool {
            DbPool::Postgres(pool) => sqlx::query_as(sql).bind(id.0.to_string()).fetch_optional(pool).await?,
            DbPool::Sqlite(pool) => sqlx::query_as(sql).bind(id.0.to_string()).fetch_optional(pool).await?,
        };
        row.map(Job::try_from).transpose()
    }

    /// Dispatch phase step 1 (§4.G): up to `limit` oldest `QUEUED` jobs.
    pub async fn list_queued(&self, limit: i64) -> Result<Vec<Job>, RepoError> {
        let sql = "SELECT * FROM jobs WHERE status = $1 ORDER BY created_at ASC LIMIT $2";
        let rows: Vec<JobRow> = match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query_as(sql)
                    .bind(JobStatus::Queued.as_str())
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
            DbPool::Sqlite(pool) => {
                sqlx::query_as(sql)
                    .bind(JobStatus::Queued.as_str())
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
        };
        rows.into_iter().map(Job::try_from).collect()
    }

    pub async fn mark_running(&self, id: JobId, prepared_workflow: &Value) -> Result<(), RepoError> {
        let sql = "UPDATE jobs SET status = $1, prepared_workflow = $2 WHERE id = $3";
        let prepared_json =
            serde_json::to_string(prepared_workflow).map_err(|e| RepoError::Malformed(e.to_string()))?;
        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql)
                    .bind(JobStatus::Running.as_str())
                    .bind(&prepared_json)
                    .bind(id.0.to_string())
                    .execute(pool)
                    .await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(JobStatus::Running.as_str())
                    .bind(&prepared_json)
                    .bind(id.0.to_string())
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Terminal transition (§4.G poll phase, §7 propagation policy). Per
    /// I1/I2, callers must only invoke this from the scheduler.
    pub async fn finalize(
        &self,
        id: JobId,
        status: JobStatus,
        result: Option<&Value>,
        error_message: Option<&str>,
    ) -> Result<(), RepoError> {
        let sql = "UPDATE jobs SET status = $1, result = $2, error_message = $3 WHERE id = $4";
        let result_json = result
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepoError::Malformed(e.to_string()))?;
        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql)
                    .bind(status.as_str())
                    .bind(&result_json)
                    .bind(error_message)
                    .bind(id.0.to_string())
                    .execute(pool)
                    .await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(status.as_str())
                    .bind(&result_json)
                    .bind(error_message)
                    .bind(id.0.to_string())
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Quota Enforcer concurrent check (§4.I): count of `{QUEUED,RUNNING}`
    /// jobs for `user_id`.
    pub async fn count_active_for_user(&self, user_id: UserId) -> Result<i64, RepoError> {
        let sql = "SELECT COUNT(*) FROM jobs WHERE user_id = $1 AND status IN ($2, $3)";
        let count: i64 = match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query_scalar(sql)
                    .bind(user_id.0.to_string())
                    .bind(JobStatus::Queued.as_str())
                    .bind(JobStatus::Running.as_str())
                    .fetch_one(pool)
                    .await?
            }
            DbPool::Sqlite(pool) => {
                sqlx::query_scalar(sql)
                    .bind(user_id.0.to_string())
                    .bind(JobStatus::Queued.as_str())
                    .bind(JobStatus::Running.as_str())
                    .fetch_one(pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Quota Enforcer daily check (§4.I): jobs created in the trailing 24h.
    pub async fn count_created_since(
        &self,
        user_id: UserId,
        since: chrono::DateTime<Utc>,
    ) -> Result<i64, RepoError> {
        let sql = "SELECT COUNT(*) FROM jobs WHERE user_id = $1 AND created_at >= $2";
        let count: i64 = match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query_scalar(sql)
                    .bind(user_id.0.to_string())
                    .bind(since.to_rfc3339())
                    .fetch_one(pool)
                    .await?
            }
            DbPool::Sqlite(pool) => {
                sqlx::query_scalar(sql)
                    .bind(user_id.0.to_string())
                    .bind(since.to_rfc3339())
                    .fetch_one(pool)
                    .await?
            }
        };
        Ok(count)
    }
}
