//! `POST /v1/admin/nodes/{id}/health-check` (§4.K): a manual trigger for the
//! same probe the Health Loop (§4.F) runs on its own tick, for operators who
//! don't want to wait out `health.interval_secs`.

use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::{Object, OpenApi};
use uuid::Uuid;

use forge_common::recorded_http_api_request;

use crate::api::{ApiError, ApiTags};
use crate::health::{HealthLoop, HealthLoopConfig};
use crate::model::WorkerNodeId;
use crate::repo::worker_node::WorkerNodeRepo;
use crate::worker_client::WorkerHttpClient;

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Object, Debug, Clone)]
pub struct HealthCheckTriggeredResponse {
    pub node_id: String,
    pub is_active: bool,
}

pub struct AdminApi {
    pub nodes: WorkerNodeRepo,
    pub worker_client: WorkerHttpClient,
    pub dead_after: chrono::Duration,
}

#[OpenApi(prefix_path = "/v1/admin/nodes", tag = ApiTags::Admin)]
impl AdminApi {
    #[oai(path = "/:id/health-check", method = "post", operation_id = "trigger_node_health_check")]
    async fn trigger_health_check(
        &self,
        #[oai(name = "id")] id: Path<Uuid>,
    ) -> ApiResult<Json<HealthCheckTriggeredResponse>> {
        let record = recorded_http_api_request!("trigger_node_health_check", node_id = id.0.to_string());
        let response = async {
            let node_id = WorkerNodeId(id.0);
            let node = self
                .nodes
                .get(node_id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("worker node {} not found", id.0)))?;

            let health = HealthLoop::new(
                self.nodes.clone(),
                self.worker_client.clone(),
                HealthLoopConfig { interval: std::time::Duration::from_secs(30), dead_after: self.dead_after },
            );
            health.probe_one(&node.id, &node.base_url, node.last_seen).await?;

            let refreshed = self.nodes.get(node_id).await?.unwrap_or(node);
            Ok(Json(HealthCheckTriggeredResponse {
                node_id: refreshed.id.to_string(),
                is_active: refreshed.is_active,
            }))
        }
        .await;
        record.result(response)
    }
}
