//! Quota Enforcer (§4.I): two synchronous pre-submit checks against
//! `UserLimits`. Grounded on `cloud-common/src/clients/limit.rs`'s role as a
//! pre-flight limit check ahead of the operation it gates, adapted here from
//! a remote gRPC call to a local repository read (I7: counts are read from
//! the same repository snapshot the submission transaction uses).

use chrono::Duration;
use thiserror::Error;

use forge_common::safe_display::SafeDisplay;

use crate::model::UserId;
use crate::repo::job::JobRepo;
use crate::repo::user_limits::UserLimitsRepo;
use crate::repo::RepoError;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("user has reached the maximum of {limit} concurrent jobs")]
    ConcurrentLimitExceeded { limit: i32 },
    #[error("user has reached the maximum of {limit} jobs per day")]
    DailyLimitExceeded { limit: i32 },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl SafeDisplay for QuotaError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}

pub struct QuotaEnforcer {
    limits: UserLimitsRepo,
    jobs: JobRepo,
}

impl QuotaEnforcer {
    pub fn new(limits: UserLimitsRepo, jobs: JobRepo) -> Self {
        Self { limits, jobs }
    }

    /// Runs both checks; returns the first violation found, concurrent
    /// before daily, matching the order §4.I lists them in.
    pub async fn check(&self, user_id: UserId) -> Result<(), QuotaError> {
        let limits = self.limits.get_or_create(user_id).await?;

        let active = self.jobs.count_active_for_user(user_id).await?;
        if active >= limits.max_concurrent_jobs as i64 {
            return Err(QuotaError::ConcurrentLimitExceeded { limit: limits.max_concurrent_jobs });
        }

        let since = chrono::Utc::now() - Duration::hours(24);
        let created_today = self.jobs.count_created_since(user_id, since).await?;
        if created_today >= limits.max_jobs_per_day as i64 {
            return Err(QuotaError::DailyLimitExceeded { limit: limits.max_jobs_per_day });
        }

        Ok(())
    }
}
