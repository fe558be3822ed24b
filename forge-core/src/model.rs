//! Domain model: the entities in `spec.md` §3, plus the `*Row` sqlx-mappable
//! shadow types used only at the repository boundary (`forge_core::repo`),
//! the same seam the teacher draws in `cloud-common/src/repo/component.rs`
//! between a domain `CloudComponentOwner` and its `CloudComponentOwnerRow`.

use chrono::{DateTime, Utc};
use forge_common::id_newtype;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

id_newtype!(WorkflowId);
id_newtype!(JobId);
id_newtype!(JobExecutionId);
id_newtype!(WorkerNodeId);
id_newtype!(UserId);

/// Stored as a plain `TEXT` column in both backends (see `repo` module docs);
/// no `sqlx::Type` derive here since a native enum type isn't portable
/// between Postgres and SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(JobStatus::Queued),
            "RUNNING" => Ok(JobStatus::Running),
            "DONE" => Ok(JobStatus::Done),
            "ERROR" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "QUEUED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Done => "DONE",
            ExecutionStatus::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(ExecutionStatus::Queued),
            "RUNNING" => Ok(ExecutionStatus::Running),
            "DONE" => Ok(ExecutionStatus::Done),
            "ERROR" => Ok(ExecutionStatus::Error),
            other => Err(format!("unknown execution status '{other}'")),
        }
    }
}

/// The authoring Workflow: a `ui_graph` (parsed on demand by `forge_compiler::Graph::parse`)
/// paired with the declarative Spec describing its user-facing inputs.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub slug: String,
    pub name: String,
    pub category: String,
    pub version: String,
    pub is_active: bool,
    pub requires_mask: bool,
    pub ui_graph: Value,
    pub spec: forge_compiler::Spec,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub workflow_id: WorkflowId,
    pub mode: String,
    pub inputs: Value,
    pub files: HashMap<String, String>,
    pub prepared_workflow: Option<Value>,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JobExecution {
    pub id: JobExecutionId,
    pub job_id: JobId,
    pub node_id: WorkerNodeId,
    pub status: ExecutionStatus,
    pub prompt_id: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A registered backend worker node. `priority` and `max_queue` default to
/// `10`/`1` per `original_source/app/models/comfy_node.py`, adopted verbatim
/// since `spec.md` left the concrete defaults unspecified (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct WorkerNode {
    pub id: WorkerNodeId,
    pub name: String,
    pub base_url: String,
    pub is_active: bool,
    pub max_queue: i32,
    pub priority: i32,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Default for WorkerNode {
    fn default() -> Self {
        Self {
            id: WorkerNodeId::new_v4(),
            name: String::new(),
            base_url: String::new(),
            is_active: true,
            max_queue: 1,
            priority: 10,
            last_seen: None,
        }
    }
}

/// Per-user quota configuration, created lazily with these defaults on first
/// access (`original_source/app/models/user_limits.py`).
#[derive(Debug, Clone)]
pub struct UserLimits {
    pub user_id: UserId,
    pub max_concurrent_jobs: i32,
    pub max_jobs_per_day: i32,
}

impl UserLimits {
    pub fn default_for(user_id: UserId) -> Self {
        Self {
            user_id,
            max_concurrent_jobs: 1,
            max_jobs_per_day: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProgressStatus {
    Running,
    Done,
    Error,
}

/// In-memory, process-local progress cache entry (§4.H). Never persisted;
/// see `spec.md` §9 design notes on the "global mutable progress cache"
/// redesign, carried out as `forge_core::progress::ProgressRegistry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub prompt_id: String,
    pub node_id: WorkerNodeId,
    pub percent: f64,
    pub value: Option<f64>,
    pub max: Option<f64>,
    pub status: ProgressStatus,
    pub updated_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// Flattened artifact shape produced by the Result Normalizer (§4.J).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct JobResult {
    pub images: Vec<Artifact>,
}
