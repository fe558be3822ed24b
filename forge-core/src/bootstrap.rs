//! Service wiring: connects the configured database, runs migrations, seeds
//! worker nodes from config, and assembles the shared `AppState` every HTTP
//! handler and background loop borrows. Grounded on `Services::new` /
//! `make_with_db` in `cloud-service/src/bootstrap.rs`, simplified from a
//! `DB: Pool`-generic construction to the concrete `DbPool` enum this crate
//! uses (see `repo::mod` docs).

use std::sync::Arc;
use std::time::Duration;

use forge_common::config::{DbConfig, DbPostgresConfig, DbSqliteConfig};
use forge_compiler::staging::{FileStore, LocalFileStore};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;

use crate::config::AppConfig;
use crate::health::{HealthLoop, HealthLoopConfig};
use crate::progress::ProgressRegistry;
use crate::quota::QuotaEnforcer;
use crate::repo::job::JobRepo;
use crate::repo::job_execution::JobExecutionRepo;
use crate::repo::user_limits::UserLimitsRepo;
use crate::repo::worker_node::WorkerNodeRepo;
use crate::repo::workflow::WorkflowRepo;
use crate::repo::DbPool;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::worker_client::WorkerHttpClient;

#[derive(Clone)]
pub struct Services {
    pub jobs: JobRepo,
    pub executions: JobExecutionRepo,
    pub worker_nodes: WorkerNodeRepo,
    pub workflows: WorkflowRepo,
    pub user_limits: UserLimitsRepo,
    pub worker_client: WorkerHttpClient,
    pub progress: Arc<ProgressRegistry>,
    pub quota: Arc<QuotaEnforcer>,
    pub storage_root: String,
    pub file_store: Arc<dyn FileStore>,
}

impl Services {
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = connect(&config.db).await?;
        pool.migrate().await?;

        let jobs = JobRepo::new(pool.clone());
        let executions = JobExecutionRepo::new(pool.clone());
        let worker_nodes = WorkerNodeRepo::new(pool.clone());
        let workflows = WorkflowRepo::new(pool.clone());
        let user_limits = UserLimitsRepo::new(pool.clone());

        for seed in &config.workers {
            worker_nodes
                .ensure_seeded(&seed.name, &seed.base_url, seed.priority, seed.max_queue)
                .await?;
        }

        let worker_client = WorkerHttpClient::new();
        let progress = Arc::new(ProgressRegistry::new());
        let quota = Arc::new(QuotaEnforcer::new(user_limits.clone(), jobs.clone()));
        let file_store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(&config.storage_root));

        Ok(Self {
            jobs,
            executions,
            worker_nodes,
            workflows,
            user_limits,
            worker_client,
            progress,
            quota,
            storage_root: config.storage_root.clone(),
            file_store,
        })
    }

    pub fn scheduler(&self, config: &AppConfig) -> Scheduler {
        Scheduler::new(
            self.jobs.clone(),
            self.executions.clone(),
            self.worker_nodes.clone(),
            self.workflows.clone(),
            self.worker_client.clone(),
            self.progress.clone(),
            self.file_store.clone(),
            SchedulerConfig {
                tick_interval: config.scheduler.tick_interval(),
                dispatch_batch_size: config.scheduler.dispatch_batch_size,
                poll_batch_size: config.scheduler.poll_batch_size,
            },
        )
    }

    pub fn health_loop(&self, config: &AppConfig) -> HealthLoop {
        HealthLoop::new(
            self.worker_nodes.clone(),
            self.worker_client.clone(),
            HealthLoopConfig { interval: config.health.interval(), dead_after: config.health.dead_after() },
        )
    }
}

async fn connect(db: &DbConfig) -> anyhow::Result<DbPool> {
    match db {
        DbConfig::Postgres(cfg) => Ok(DbPool::Postgres(connect_postgres(cfg).await?)),
        DbConfig::Sqlite(cfg) => Ok(DbPool::Sqlite(connect_sqlite(cfg).await?)),
    }
}

async fn connect_postgres(cfg: &DbPostgresConfig) -> anyhow::Result<sqlx::PgPool> {
    let url = format!(
        "postgres://{}:{}@{}:{}/{}",
        cfg.username, cfg.password, cfg.host, cfg.port, cfg.database
    );
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&url)
        .await?;
    Ok(pool)
}

async fn connect_sqlite(cfg: &DbSqliteConfig) -> anyhow::Result<sqlx::SqlitePool> {
    let url = format!("sqlite://{}?mode=rwc", cfg.database);
    let pool = SqlitePoolOptions::new().max_connections(cfg.max_connections).connect(&url).await?;
    Ok(pool)
}
