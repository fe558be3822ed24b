//! `POST /v1/jobs`, `GET /v1/jobs/{id}`, `GET /v1/jobs/{id}/progress` (§4.K).
//! Grounded on `cloud-service/src/api/limits.rs`'s handler shape
//! (`recorded_http_api_request!` + `.instrument` + `record.result`), with the
//! request body taken as a raw `Json<Value>` rather than a typed `Object`
//! since a Job's `inputs`/`files` shape is declared per-Workflow by its Spec,
//! not fixed at the API layer.

use std::str::FromStr;
use std::sync::Arc;

use forge_common::error::ErrorBody;
use forge_common::recorded_http_api_request;
use poem_openapi::param::{Header, Path};
use poem_openapi::payload::Json;
use poem_openapi::{Object, OpenApi};
use serde_json::Value;
use uuid::Uuid;

use crate::api::{ApiError, ApiTags};
use crate::model::{JobId, JobResult, UserId};
use crate::progress::ProgressRegistry;
use crate::quota::QuotaEnforcer;
use crate::repo::job::JobRepo;
use crate::repo::job_execution::JobExecutionRepo;
use crate::repo::workflow::WorkflowRepo;

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Object, Debug, Clone)]
pub struct SubmitJobResponse {
    pub id: String,
    pub status: String,
}

#[derive(Object, Debug, Clone)]
pub struct ArtifactObject {
    pub filename: String,
    pub subfolder: String,
    pub artifact_type: String,
}

impl From<crate::model::Artifact> for ArtifactObject {
    fn from(value: crate::model::Artifact) -> Self {
        Self { filename: value.filename, subfolder: value.subfolder, artifact_type: value.artifact_type }
    }
}

#[derive(Object, Debug, Clone)]
pub struct JobResultObject {
    pub images: Vec<ArtifactObject>,
}

impl From<JobResult> for JobResultObject {
    fn from(value: JobResult) -> Self {
        Self { images: value.images.into_iter().map(ArtifactObject::from).collect() }
    }
}

#[derive(Object, Debug, Clone)]
pub struct JobResponse {
    pub id: String,
    pub status: String,
    pub result: Option<JobResultObject>,
    pub error_message: Option<String>,
}

#[derive(Object, Debug, Clone)]
pub struct ProgressResponse {
    pub prompt_id: Option<String>,
    pub percent: f64,
    pub status: String,
    pub message: Option<String>,
}

pub struct JobsApi {
    pub jobs: JobRepo,
    pub executions: JobExecutionRepo,
    pub workflows: WorkflowRepo,
    pub quota: Arc<QuotaEnforcer>,
    pub progress: Arc<ProgressRegistry>,
}

#[OpenApi(prefix_path = "/v1/jobs", tag = ApiTags::Jobs)]
impl JobsApi {
    /// Submit a job (§4.K): resolves the Workflow by slug, runs the Quota
    /// Enforcer, then persists `QUEUED`. The Scheduler picks it up on its
    /// next tick.
    #[oai(path = "/", method = "post", operation_id = "submit_job")]
    async fn submit(
        &self,
        #[oai(name = "X-User-Id")] user_id: Header<String>,
        body: Json<Value>,
    ) -> ApiResult<Json<SubmitJobResponse>> {
        let record = recorded_http_api_request!("submit_job");
        let response = async {
            let user_id = parse_user_id(&user_id.0)?;

            let slug = body
                .0
                .get("workflow_slug")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::bad_request("workflow_slug is required"))?;
            let mode = body.0.get("mode").and_then(Value::as_str).unwrap_or("").to_string();
            let inputs = body.0.get("inputs").cloned().unwrap_or(Value::Object(Default::default()));
            let files: std::collections::HashMap<String, String> = body
                .0
                .get("files")
                .and_then(Value::as_object)
                .map(|obj| {
                    obj.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default();

            let workflow = self
                .workflows
                .get_by_slug(slug)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("no active workflow with slug '{slug}'")))?;

            self.quota.check(user_id).await?;

            let job = self.jobs.create(user_id, workflow.id, mode, inputs, files).await?;

            Ok(Json(SubmitJobResponse { id: job.id.to_string(), status: job.status.as_str().to_string() }))
        }
        .await;
        record.result(response)
    }

    /// Fetch a job's status/result (§4.K).
    #[oai(path = "/:id", method = "get", operation_id = "get_job")]
    async fn get(&self, #[oai(name = "id")] id: Path<Uuid>) -> ApiResult<Json<JobResponse>> {
        let record = recorded_http_api_request!("get_job", job_id = id.0.to_string());
        let response = async {
            let job = self
                .jobs
                .get(JobId(id.0))
                .await?
                .ok_or_else(|| ApiError::not_found(format!("job {} not found", id.0)))?;

            let result = job
                .result
                .map(|v| serde_json::from_value::<JobResult>(v).map(JobResultObject::from))
                .transpose()
                .map_err(|e| ApiError::InternalError(Json(ErrorBody { error: e.to_string() })))?;

            Ok(Json(JobResponse {
                id: job.id.to_string(),
                status: job.status.as_str().to_string(),
                result,
                error_message: job.error_message,
            }))
        }
        .await;
        record.result(response)
    }

    /// Fetch the in-memory progress record for a job's latest execution
    /// (§4.K, §4.H). `percent = 0.0`/`status = "QUEUED"` if no execution has
    /// started yet.
    #[oai(path = "/:id/progress", method = "get", operation_id = "get_job_progress")]
    async fn progress(&self, #[oai(name = "id")] id: Path<Uuid>) -> ApiResult<Json<ProgressResponse>> {
        let record = recorded_http_api_request!("get_job_progress", job_id = id.0.to_string());
        let response = async {
            let job = self
                .jobs
                .get(JobId(id.0))
                .await?
                .ok_or_else(|| ApiError::not_found(format!("job {} not found", id.0)))?;

            let execution = self.executions.latest_for_job(job.id).await?;
            let Some(execution) = execution else {
                return Ok(Json(ProgressResponse {
                    prompt_id: None,
                    percent: 0.0,
                    status: job.status.as_str().to_string(),
                    message: None,
                }));
            };
            let Some(prompt_id) = execution.prompt_id.clone() else {
                return Ok(Json(ProgressResponse {
                    prompt_id: None,
                    percent: 0.0,
                    status: execution.status.as_str().to_string(),
                    message: None,
                }));
            };

            match self.progress.get(&prompt_id) {
                Some(p) => Ok(Json(ProgressResponse {
                    prompt_id: Some(prompt_id),
                    percent: p.percent,
                    status: format!("{:?}", p.status).to_uppercase(),
                    message: p.message,
                })),
                None => Ok(Json(ProgressResponse {
                    prompt_id: Some(prompt_id),
                    percent: 0.0,
                    status: execution.status.as_str().to_string(),
                    message: None,
                })),
            }
        }
        .await;
        record.result(response)
    }
}

fn parse_user_id(header: &str) -> ApiResult<UserId> {
    Uuid::from_str(header).map(UserId).map_err(|_| ApiError::bad_request("X-User-Id must be a UUID"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_uuid_user_id_header() {
        assert!(parse_user_id("not-a-uuid").is_err());
    }

    #[test]
    fn accepts_valid_uuid_user_id_header() {
        let id = Uuid::new_v4();
        assert_eq!(parse_user_id(&id.to_string()).unwrap(), UserId(id));
    }
}
