use super::{DbPool, RepoError};
use crate::model::{UserId, UserLimits};

#[derive(sqlx::FromRow, Debug, Clone)]
struct UserLimitsRow {
    user_id: String,
    max_concurrent_jobs: i64,
    max_jobs_per_day: i64,
}

impl TryFrom<UserLimitsRow> for UserLimits {
    type Error = RepoError;

    fn try_from(row: UserLimitsRow) -> Result<Self, Self::Error> {
        Ok(UserLimits {
            user_id: UserId(
                uuid::Uuid::parse_str(&row.user_id).map_err(|e| RepoError::Malformed(e.to_string()))?,
            ),
            max_concurrent_jobs: row.max_concurrent_jobs as i32,
            max_jobs_per_day: row.max_jobs_per_day as i32,
        })
    }
}

#[derive(Clone)]
pub struct UserLimitsRepo {
    pool: DbPool,
}

impl UserLimitsRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// `UserLimits` rows are created lazily with defaults on first access,
    /// per `original_source/app/models/user_limits.py`.
    pub async fn get_or_create(&self, user_id: UserId) -> Result<UserLimits, RepoError> {
        let sql = "SELECT * FROM user_limits WHERE user_id = $1";
        let row: Option<UserLimitsRow> = match &self.pool {
            DbPool::Postgres(pool) => sqlx::query_as(sql).bind(user_id.0.to_string()).fetch_optional(pool).await?,
            DbPool::Sqlite(pool) => sqlx::query_as(sql).bind(user_id.0.to_string()).fetch_optional(pool).await?,
        };
        if let Some(row) = row {
            return UserLimits::try_from(row);
        }

        let defaults = UserLimits::default_for(user_id);
        let insert_sql = "INSERT INTO user_limits (user_id, max_concurrent_jobs, max_jobs_per_day) \
                           VALUES ($1, $2, $3)";
        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(insert_sql)
                    .bind(user_id.0.to_string())
                    .bind(defaults.max_concurrent_jobs as i64)
                    .bind(defaults.max_jobs_per_day as i64)
                    .execute(pool)
                    .await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(insert_sql)
                    .bind(user_id.0.to_string())
                    .bind(defaults.max_concurrent_jobs as i64)
                    .bind(defaults.max_jobs_per_day as i64)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(defaults)
    }
}
