use poem_openapi::Object;
use serde::{Deserialize, Serialize};

/// Single-message error body, used for 401/403/404/409/500 responses.
/// Grounded on `golem_common::model::error::ErrorBody` as referenced
/// throughout `cloud-service/src/api/*.rs`.
#[derive(Object, Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Multi-message error body, used for 400 validation responses.
#[derive(Object, Clone, Debug, Serialize, Deserialize)]
pub struct ErrorsBody {
    pub errors: Vec<String>,
}
