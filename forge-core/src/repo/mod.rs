//! Repository layer: one small trait-free `impl` per aggregate, backed by a
//! concrete `DbPool` enum.
//!
//! Grounded on `cloud-common/src/repo/{mod,component}.rs`, which keys a
//! `Database`-generic repository on a `RowMeta<DB>` trait object. That
//! trait's definition lives in the unavailable `golem_common::repo`, so
//! instead of fabricating it, repositories here are generic over a concrete
//! `enum DbPool { Postgres(PgPool), Sqlite(SqlitePool) }` — one level of
//! indirection down from the teacher's, matching the same
//! `DbConfig::Postgres | Sqlite` split the teacher already makes one layer up
//! in `golem_common::config::DbConfig` (mirrored here as
//! `forge_common::config::DbConfig`). Every query string uses `$1, $2, ...`
//! placeholders, which both the Postgres and SQLite sqlx drivers accept, so
//! one query string serves both arms of the match.

pub mod job;
pub mod job_execution;
pub mod user_limits;
pub mod worker_node;
pub mod workflow;

use forge_common::safe_display::SafeDisplay;
use sqlx::{PgPool, SqlitePool};

#[derive(Clone)]
pub enum DbPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        match self {
            DbPool::Postgres(pool) => sqlx::migrate!("./migrations").run(pool).await,
            DbPool::Sqlite(pool) => sqlx::migrate!("./migrations").run(pool).await,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("row for {0} not found")]
    NotFound(String),
    #[error("stored row was malformed: {0}")]
    Malformed(String),
}

impl SafeDisplay for RepoError {
    fn to_safe_string(&self) -> String {
        match self {
            RepoError::Database(_) => "database error".to_string(),
            RepoError::NotFound(what) => format!("not found: {what}"),
            RepoError::Malformed(what) => format!("malformed row: {what}"),
        }
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>, RepoError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| RepoError::Malformed(format!("bad timestamp '{s}': {e}")))
}
