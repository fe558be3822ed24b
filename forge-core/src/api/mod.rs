//! The thin HTTP surface (§4.K): `POST /v1/jobs`, `GET /v1/jobs/{id}`,
//! `GET /v1/jobs/{id}/progress`, `GET /healthcheck`, `GET /version`, and
//! `POST /v1/admin/nodes/{id}/health-check`. Grounded on the teacher's
//! per-group `*Api` struct + combined `Apis` tuple shape
//! (`cloud-component-service/src/api/mod.rs`), simplified from OAuth2/session
//! auth to a `X-User-Id` header, matching §4.K's note that callers
//! authenticate out of band.

mod admin;
mod healthcheck;
mod jobs;

use forge_common::error::{ErrorBody, ErrorsBody};
use forge_common::metrics::TraceErrorKind;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, OpenApiService, Tags};

use crate::bootstrap::Services;
use crate::config::AppConfig;
use crate::quota::QuotaError;
use crate::repo::RepoError;

#[derive(Tags)]
enum ApiTags {
    Jobs,
    Admin,
    HealthCheck,
}

#[derive(ApiResponse, Debug, Clone)]
pub enum ApiError {
    #[oai(status = 400)]
    BadRequest(Json<ErrorsBody>),
    #[oai(status = 403)]
    LimitExceeded(Json<ErrorBody>),
    #[oai(status = 404)]
    NotFound(Json<ErrorBody>),
    #[oai(status = 500)]
    InternalError(Json<ErrorBody>),
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        ApiError::BadRequest(Json(ErrorsBody { errors: vec![error.into()] }))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound(Json(ErrorBody { error: what.into() }))
    }
}

impl TraceErrorKind for ApiError {
    fn trace_error_kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::LimitExceeded(_) => "LimitExceeded",
            ApiError::NotFound(_) => "NotFound",
            ApiError::InternalError(_) => "InternalError",
        }
    }

    fn is_expected(&self) -> bool {
        !matches!(self, ApiError::InternalError(_))
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        use forge_common::safe_display::SafeDisplay;
        match value {
            RepoError::NotFound(_) => ApiError::NotFound(Json(ErrorBody { error: value.to_safe_string() })),
            other => ApiError::InternalError(Json(ErrorBody { error: other.to_safe_string() })),
        }
    }
}

impl From<QuotaError> for ApiError {
    fn from(value: QuotaError) -> Self {
        use forge_common::safe_display::SafeDisplay;
        match value {
            QuotaError::Repo(inner) => inner.into(),
            other => ApiError::LimitExceeded(Json(ErrorBody { error: other.to_safe_string() })),
        }
    }
}

pub type Apis = (jobs::JobsApi, admin::AdminApi, healthcheck::HealthcheckApi);

pub fn make_open_api_service(services: &Services, config: &AppConfig) -> OpenApiService<Apis, ()> {
    OpenApiService::new(
        (
            jobs::JobsApi {
                jobs: services.jobs.clone(),
                executions: services.executions.clone(),
                workflows: services.workflows.clone(),
                quota: services.quota.clone(),
                progress: services.progress.clone(),
            },
            admin::AdminApi {
                nodes: services.worker_nodes.clone(),
                worker_client: services.worker_client.clone(),
                dead_after: config.health.dead_after(),
            },
            healthcheck::HealthcheckApi,
        ),
        "Forge Orchestration API",
        crate::VERSION,
    )
}
