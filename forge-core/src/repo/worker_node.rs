use chrono::Utc;

use super::{parse_timestamp, DbPool, RepoError};
use crate::model::{WorkerNode, WorkerNodeId};

#[derive(sqlx::FromRow, Debug, Clone)]
struct WorkerNodeRow {
    id: String,
    name: String,
    base_url: String,
    is_active: i64,
    max_queue: i64,
    priority: i64,
    last_seen: Option<String>,
}

impl TryFrom<WorkerNodeRow> for WorkerNode {
    type Error = RepoError;

    fn try_from(row: WorkerNodeRow) -> Result<Self, Self::Error> {
        Ok(WorkerNode {
            id: WorkerNodeId(uuid::Uuid::parse_str(&row.id).map_err(|e| RepoError::Malformed(e.to_string()))?),
            name: row.name,
            base_url: row.base_url,
            is_active: row.is_active != 0,
            max_queue: row.max_queue as i32,
            priority: row.priority as i32,
            last_seen: row.last_seen.map(|s| parse_timestamp(&s)).transpose()?,
        })
    }
}

#[derive(Clone)]
pub struct WorkerNodeRepo {
    pool: DbPool,
}

impl WorkerNodeRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Seeds a node from config on bootstrap (`WorkerNodeConfig`), matching
    /// the teacher's `AccountsConfig`-seeding idiom noted in SPEC_FULL.md §6.
    /// Idempotent on `base_url`.
    pub async fn ensure_seeded(&self, name: &str, base_url: &str, priority: i32, max_queue: i32) -> Result<(), RepoError> {
        let existing_sql = "SELECT * FROM worker_nodes WHERE base_url = $1";
        let existing: Option<WorkerNodeRow> = match &self.pool {
            DbPool::Postgres(pool) => sqlx::query_as(existing_sql).bind(base_url).fetch_optional(pool).await?,
            DbPool::Sqlite(pool) => sqlx::query_as(existing_sql).bind(base_url).fetch_optional(pool).await?,
        };
        if existing.is_some() {
            return Ok(());
        }

        let node = WorkerNode {
            id: WorkerNodeId::new_v4(),
            name: name.to_string(),
            base_url: base_url.to_string(),
            is_active: true,
            max_queue,
            priority,
            last_seen: None,
        };
        let sql = "INSERT INTO worker_nodes (id, name, base_url, is_active, max_queue, priority, last_seen) \
                    VALUES ($1, $2, $3, $4, $5, $6, $7)";
        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql)
                    .bind(node.id.0.to_string())
                    .bind(&node.name)
                    .bind(&node.base_url)
                    .bind(node.is_active as i64)
                    .bind(node.max_queue as i64)
                    .bind(node.priority as i64)
                    .bind(Option::<String>::None)
                    .execute(pool)
                    .await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(node.id.0.to_string())
                    .bind(&node.name)
                    .bind(&node.base_url)
                    .bind(node.is_active as i64)
                    .bind(node.max_queue as i64)
                    .bind(node.priority as i64)
                    .bind(Option::<String>::None)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<WorkerNode>, RepoError> {
        let sql = "SELECT * FROM worker_nodes ORDER BY priority ASC, id ASC";
        let rows: Vec<WorkerNodeRow> = match &self.pool {
            DbPool::Postgres(pool) => sqlx::query_as(sql).fetch_all(pool).await?,
            DbPool::Sqlite(pool) => sqlx::query_as(sql).fetch_all(pool).await?,
        };
        rows.into_iter().map(WorkerNode::try_from).collect()
    }

    /// Node-selection candidates (§4.G step 2): active nodes only (I6).
    pub async fn list_active(&self) -> Result<Vec<WorkerNode>, RepoError> {
        let sql = "SELECT * FROM worker_nodes WHERE is_active = $1 ORDER BY priority ASC, id ASC";
        let rows: Vec<WorkerNodeRow> = match &self.pool {
            DbPool::Postgres(pool) => sqlx::query_as(sql).bind(1i64).fetch_all(pool).await?,
            DbPool::Sqlite(pool) => sqlx::query_as(sql).bind(1i64).fetch_all(pool).await?,
        };
        rows.into_iter().map(WorkerNode::try_from).collect()
    }

    pub async fn get(&self, id: WorkerNodeId) -> Result<Option<WorkerNode>, RepoError> {
        let sql = "SELECT * FROM worker_nodes WHERE id = $1";
        let row: Option<WorkerNodeRow> = match &self.pool {
            DbPool::Postgres(pool) => sqlx::query_as(sql).bind(id.0.to_string()).fetch_optional(pool).await?,
            DbPool::Sqlite(pool) => sqlx::query_as(sql).bind(id.0.to_string()).fetch_optional(pool).await?,
        };
        row.map(WorkerNode::try_from).transpose()
    }

    /// Health Loop success path (§4.F): `last_seen = now`, `is_active = true`.
    pub async fn mark_seen(&self, id: WorkerNodeId) -> Result<(), RepoError> {
        let sql = "UPDATE worker_nodes SET last_seen = $1, is_active = $2 WHERE id = $3";
        let now = Utc::now().to_rfc3339();
        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql).bind(&now).bind(1i64).bind(id.0.to_string()).execute(pool).await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql).bind(&now).bind(1i64).bind(id.0.to_string()).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Health Loop failure path (§4.F): flips `is_active = false` once
    /// `DEAD_AFTER` has elapsed since `last_seen`.
    pub async fn mark_inactive(&self, id: WorkerNodeId) -> Result<(), RepoError> {
        let sql = "UPDATE worker_nodes SET is_active = $1 WHERE id = $2";
        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql).bind(0i64).bind(id.0.to_string()).execute(pool).await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql).bind(0i64).bind(id.0.to_string()).execute(pool).await?;
            }
        }
        Ok(())
    }
}
