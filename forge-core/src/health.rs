//! Health Loop (§4.F): periodic liveness probing of known worker nodes.
//! Grounded on the teacher's periodic-task shape in `cloud-service/src/lib.rs`
//! (a `tokio::time::interval` tick loop spawned alongside the HTTP server),
//! adapted here to drive `WorkerHttpClient::system_stats` against every
//! `WorkerNode` row instead of a gRPC channel health check.

use std::time::Duration;
use tracing::{info, warn};

use crate::repo::worker_node::WorkerNodeRepo;
use crate::repo::RepoError;
use crate::worker_client::WorkerHttpClient;

pub struct HealthLoopConfig {
    pub interval: Duration,
    pub dead_after: chrono::Duration,
}

impl Default for HealthLoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            dead_after: chrono::Duration::seconds(90),
        }
    }
}

pub struct HealthLoop {
    nodes: WorkerNodeRepo,
    worker_client: WorkerHttpClient,
    config: HealthLoopConfig,
}

impl HealthLoop {
    pub fn new(nodes: WorkerNodeRepo, worker_client: WorkerHttpClient, config: HealthLoopConfig) -> Self {
        Self { nodes, worker_client, config }
    }

    /// Runs forever on `config.interval`. Intended as one member of the
    /// process's `tokio::task::JoinSet`.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep().await {
                warn!(error = %e, "health loop sweep failed to list nodes");
            }
        }
    }

    /// One pass over every known node (§4.F). Exposed separately so the
    /// manual admin trigger (`POST /v1/admin/nodes/{id}/health-check`) can
    /// invoke the same probe logic for a single node without waiting for the
    /// next tick.
    pub async fn sweep(&self) -> Result<(), RepoError> {
        let nodes = self.nodes.list_all().await?;
        for node in nodes {
            self.probe_one(&node.id, &node.base_url, node.last_seen).await?;
        }
        Ok(())
    }

    pub async fn probe_one(
        &self,
        node_id: &crate::model::WorkerNodeId,
        base_url: &str,
        last_seen: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), RepoError> {
        match self.worker_client.system_stats(base_url).await {
            Ok(()) => {
                self.nodes.mark_seen(*node_id).await?;
            }
            Err(e) => {
                let stale = last_seen
                    .map(|seen| chrono::Utc::now() - seen > self.config.dead_after)
                    .unwrap_or(true);
                if stale {
                    warn!(node = %node_id, error = %e, "marking worker node inactive");
                    self.nodes.mark_inactive(*node_id).await?;
                } else {
                    info!(node = %node_id, error = %e, "worker node probe failed, within grace period");
                }
            }
        }
        Ok(())
    }
}
