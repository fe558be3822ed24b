use forge_common::safe_display::SafeDisplay;

/// Errors raised while turning a UI graph + Spec into an executable
/// prompt-graph. Grounded on the exception shapes scattered across
/// `original_source/app/services/{comfy_prompt_builder,comfy_prompt_builder_v2,
/// workflow_mapper}.py` (`ComfyPromptBuildError`, the various `HTTPException`
/// call sites in `workflow_mapper.py::apply_binding`), collapsed into one
/// `thiserror` enum the way the teacher collapses service errors
/// (`cloud-service/src/service/*`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("binding not found: node={node_id} field={field}")]
    BindingNotFound { node_id: String, field: String },

    #[error("mode '{mode}' is not valid for input '{key}'")]
    InvalidModeForKey { mode: String, key: String },

    #[error("pass-through cycle detected starting at node {0}")]
    PassThroughCycle(String),

    #[error("type mismatch routing through bypass/switch node {node_id}: expected {expected}, found {found}")]
    TypeMismatchThroughBypass {
        node_id: String,
        expected: String,
        found: String,
    },

    #[error("mask merge failed: {0}")]
    MaskMerge(String),

    #[error("staging failure during compile: {0}")]
    Staging(String),
}

impl SafeDisplay for CompileError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}

/// Errors raised while staging (uploading) binary inputs to a worker node.
/// Grounded on `original_source/app/services/comfy_prepare_prompt.py` and
/// the upload failure path of `original_source/app/services/comfy_client.py`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StagingError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend returned an error (status {status}): {body}")]
    BackendError { status: u16, body: String },

    #[error("local file for upload key '{0}' was not found")]
    FileNotFound(String),
}

impl SafeDisplay for StagingError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}
