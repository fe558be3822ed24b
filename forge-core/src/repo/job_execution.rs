use chrono::Utc;
use std::str::FromStr;

use super::{parse_timestamp, DbPool, RepoError};
use crate::model::{ExecutionStatus, JobExecution, JobExecutionId, JobId, WorkerNodeId};

#[derive(sqlx::FromRow, Debug, Clone)]
struct JobExecutionRow {
    id: String,
    job_id: String,
    node_id: String,
    status: String,
    prompt_id: Option<String>,
    error_message: Option<String>,
    started_at: Option<String>,
    finished_at: Option<String>,
    created_at: String,
}

impl TryFrom<JobExecutionRow> for JobExecution {
    type Error = RepoError;

    fn try_from(row: JobExecutionRow) -> Result<Self, Self::Error> {
        Ok(JobExecution {
            id: JobExecutionId(uuid::Uuid::parse_str(&row.id).map_err(|e| RepoError::Malformed(e.to_string()))?),
            job_id: JobId(uuid::Uuid::parse_str(&row.job_id).map_err(|e| RepoError::Malformed(e.to_string()))?),
            node_id: WorkerNodeId(
                uuid::Uuid::parse_str(&row.node_id).map_err(|e| RepoError::Malformed(e.to_string()))?,
            ),
            status: ExecutionStatus::from_str(&row.status).map_err(RepoError::Malformed)?,
            prompt_id: row.prompt_id,
            error_message: row.error_message,
            started_at: row.started_at.map(|s| parse_timestamp(&s)).transpose()?,
            finished_at: row.finished_at.map(|s| parse_timestamp(&s)).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(Clone)]
pub struct JobExecutionRepo {
    pool: DbPool,
}

impl JobExecutionRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// §4.G tick step 3.1: a fresh execution in `RUNNING` with `started_at = now`.
    pub async fn create_running(&self, job_id: JobId, node_id: WorkerNodeId) -> Result<JobExecution, RepoError> {
        let execution = JobExecution {
            id: JobExecutionId::new_v4(),
            job_id,
            node_id,
            status: ExecutionStatus::Running,
            prompt_id: None,
            error_message: None,
            started_at: Some(Utc::now()),
            finished_at: None,
            created_at: Utc::now(),
        };

        let sql = "INSERT INTO job_executions (id, job_id, node_id, status, prompt_id, \
                    error_message, started_at, finished_at, created_at) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)";
        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql)
                    .bind(execution.id.0.to_string())
                    .bind(execution.job_id.0.to_string())
                    .bind(execution.node_id.0.to_string())
                    .bind(execution.status.as_str())
                    .bind(Option::<String>::None)
                    .bind(Option::<String>::None)
                    .bind(execution.started_at.map(|t| t.to_rfc3339()))
                    .bind(Option::<String>::None)
                    .bind(execution.created_at.to_rfc3339())
                    .execute(pool)
                    .await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(execution.id.0.to_string())
                    .bind(execution.job_id.0.to_string())
                    .bind(execution.node_id.0.to_string())
                    .bind(execution.status.as_str())
                    .bind(Option::<String>::None)
                    .bind(Option::<String>::None)
                    .bind(execution.started_at.map(|t| t.to_rfc3339()))
                    .bind(Option::<String>::None)
                    .bind(execution.created_at.to_rfc3339())
                    .execute(pool)
                    .await?;
            }
        }
        Ok(execution)
    }

    pub async fn set_prompt_id(&self, id: JobExecutionId, prompt_id: &str) -> Result<(), RepoError> {
        let sql = "UPDATE job_executions SET prompt_id = $1 WHERE id = $2";
        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql).bind(prompt_id).bind(id.0.to_string()).execute(pool).await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql).bind(prompt_id).bind(id.0.to_string()).execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn finalize(
        &self,
        id: JobExecutionId,
        status: ExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<(), RepoError> {
        let sql = "UPDATE job_executions SET status = $1, error_message = $2, finished_at = $3 WHERE id = $4";
        let now = Utc::now().to_rfc3339();
        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql)
                    .bind(status.as_str())
                    .bind(error_message)
                    .bind(&now)
                    .bind(id.0.to_string())
                    .execute(pool)
                    .await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(status.as_str())
                    .bind(error_message)
                    .bind(&now)
                    .bind(id.0.to_string())
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Node-selection input (§4.G step 2): count of `{QUEUED,RUNNING}`
    /// executions currently assigned to `node_id`.
    pub async fn count_active_for_node(&self, node_id: WorkerNodeId) -> Result<i64, RepoError> {
        let sql = "SELECT COUNT(*) FROM job_executions WHERE node_id = $1 AND status IN ($2, $3)";
        let count: i64 = match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query_scalar(sql)
                    .bind(node_id.0.to_string())
                    .bind(ExecutionStatus::Queued.as_str())
                    .bind(ExecutionStatus::Running.as_str())
                    .fetch_one(pool)
                    .await?
            }
            DbPool::Sqlite(pool) => {
                sqlx::query_scalar(sql)
                    .bind(node_id.0.to_string())
                    .bind(ExecutionStatus::Queued.as_str())
                    .bind(ExecutionStatus::Running.as_str())
                    .fetch_one(pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Poll phase (§4.G step 4): up to `limit` `RUNNING` executions with a
    /// non-null `prompt_id`.
    pub async fn list_polling(&self, limit: i64) -> Result<Vec<JobExecution>, RepoError> {
        let sql = "SELECT * FROM job_executions WHERE status = $1 AND prompt_id IS NOT NULL \
                    ORDER BY created_at ASC LIMIT $2";
        let rows: Vec<JobExecutionRow> = match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query_as(sql)
                    .bind(ExecutionStatus::Running.as_str())
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
            DbPool::Sqlite(pool) => {
                sqlx::query_as(sql)
                    .bind(ExecutionStatus::Running.as_str())
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
        };
        rows.into_iter().map(JobExecution::try_from).collect()
    }

    /// The latest execution for a job, authoritative per I2.
    pub async fn latest_for_job(&self, job_id: JobId) -> Result<Option<JobExecution>, RepoError> {
        let sql = "SELECT * FROM job_executions WHERE job_id = $1 ORDER BY created_at DESC LIMIT 1";
        let row: Option<JobExecutionRow> = match &self.pool {
            DbPool::Postgres(pool) => sqlx::query_as(sql).bind(job_id.0.to_string()).fetch_optional(pool).await?,
            DbPool::Sqlite(pool) => sqlx::query_as(sql).bind(job_id.0.to_string()).fetch_optional(pool).await?,
        };
        row.map(JobExecution::try_from).transpose()
    }
}
