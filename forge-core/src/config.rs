//! `forged`'s configuration, mirroring `cloud-service/src/config.rs`'s
//! `CloudServiceConfig`: a flat top-level struct combining the ambient
//! concerns (`tracing`, `db`, `cors_origin_regex`) with this service's own
//! tunables (§4.F/§4.G timing knobs, the seed `workers` list).

use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use forge_common::config::DbConfig;
use forge_common::safe_display::SafeDisplay;
use forge_common::tracing_setup::TracingConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub tracing: TracingConfig,
    pub http_port: u16,
    pub db: DbConfig,
    pub workers: Vec<WorkerNodeConfig>,
    pub cors_origin_regex: String,
    pub scheduler: SchedulerTuning,
    pub health: HealthTuning,
    pub storage_root: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tracing: TracingConfig::local_dev("forge-core"),
            http_port: 8090,
            db: DbConfig::default(),
            workers: Vec::new(),
            cors_origin_regex: "http://localhost:*".to_string(),
            scheduler: SchedulerTuning::default(),
            health: HealthTuning::default(),
            storage_root: "./forge-storage".to_string(),
        }
    }
}

impl SafeDisplay for AppConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "tracing:");
        let _ = writeln!(&mut result, "{}", self.tracing.to_safe_string_indented());
        let _ = writeln!(&mut result, "HTTP port: {}", self.http_port);
        let _ = writeln!(&mut result, "DB:");
        let _ = writeln!(&mut result, "{}", self.db.to_safe_string_indented());
        let _ = writeln!(&mut result, "workers: {} seeded", self.workers.len());
        let _ = writeln!(&mut result, "CORS origin regex: {}", self.cors_origin_regex);
        let _ = writeln!(&mut result, "scheduler tick: {:?}", self.scheduler.tick_interval());
        let _ = writeln!(&mut result, "health interval: {:?}", self.health.interval());
        let _ = writeln!(&mut result, "storage root: {}", self.storage_root);
        result
    }
}

/// One seeded worker node, mirroring the teacher's `AccountsConfig` seeding
/// idiom (a config-declared list materialized into rows on bootstrap).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerNodeConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_max_queue")]
    pub max_queue: i32,
}

fn default_priority() -> i32 {
    10
}

fn default_max_queue() -> i32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerTuning {
    pub tick_interval_secs: u64,
    pub dispatch_batch_size: i64,
    pub poll_batch_size: i64,
}

impl SchedulerTuning {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

impl Default for SchedulerTuning {
    fn default() -> Self {
        Self { tick_interval_secs: 1, dispatch_batch_size: 5, poll_batch_size: 10 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthTuning {
    pub interval_secs: u64,
    pub dead_after_secs: i64,
}

impl HealthTuning {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn dead_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dead_after_secs)
    }
}

impl Default for HealthTuning {
    fn default() -> Self {
        Self { interval_secs: 30, dead_after_secs: 90 }
    }
}
