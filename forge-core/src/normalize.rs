//! Result Normalizer (§4.J): flattens the worker's `history` response into
//! `JobResult { images: [...] }`, accepting the three shapes the worker is
//! known to emit depending on version and node graph shape. Grounded on
//! `original_source/app/services/result_normalizer.py`.

use serde_json::Value;

use crate::model::{Artifact, JobResult};

/// Accepts, in order of preference:
/// 1. top-level `{ images: [...] }`
/// 2. `{ outputs: { node_id: { images: [...] } } }`
/// 3. bare `{ node_id: { images: [...] } }`
///
/// Each artifact requires a non-empty `filename`; `subfolder` defaults to
/// `""`, `type` to `"output"`. Artifacts with an unknown shape are skipped
/// silently, per §4.J.
pub fn normalize_result(value: &Value) -> JobResult {
    if let Some(images) = value.get("images").and_then(Value::as_array) {
        return JobResult { images: artifacts_from(images) };
    }

    if let Some(outputs) = value.get("outputs").and_then(Value::as_object) {
        return JobResult { images: artifacts_from_node_map(outputs) };
    }

    if let Some(obj) = value.as_object() {
        return JobResult { images: artifacts_from_node_map(obj) };
    }

    JobResult::default()
}

fn artifacts_from_node_map(nodes: &serde_json::Map<String, Value>) -> Vec<Artifact> {
    nodes
        .values()
        .filter_map(|node| node.get("images").and_then(Value::as_array))
        .flat_map(|images| artifacts_from(images))
        .collect()
}

fn artifacts_from(images: &[Value]) -> Vec<Artifact> {
    images.iter().filter_map(artifact_from_value).collect()
}

fn artifact_from_value(value: &Value) -> Option<Artifact> {
    let filename = value.get("filename").and_then(Value::as_str)?;
    if filename.is_empty() {
        return None;
    }
    let subfolder = value.get("subfolder").and_then(Value::as_str).unwrap_or("").to_string();
    let artifact_type = value.get("type").and_then(Value::as_str).unwrap_or("output").to_string();
    Some(Artifact { filename: filename.to_string(), subfolder, artifact_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_top_level_images_shape() {
        let value = json!({ "images": [{ "filename": "a.png" }] });
        let result = normalize_result(&value);
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].filename, "a.png");
        assert_eq!(result.images[0].subfolder, "");
        assert_eq!(result.images[0].artifact_type, "output");
    }

    #[test]
    fn flattens_outputs_wrapper_shape() {
        let value = json!({
            "status": { "status_str": "success", "completed": true },
            "outputs": {
                "9": { "images": [{ "filename": "b.png", "subfolder": "sub", "type": "output" }] }
            }
        });
        let result = normalize_result(&value);
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].filename, "b.png");
        assert_eq!(result.images[0].subfolder, "sub");
    }

    #[test]
    fn flattens_bare_node_map_shape() {
        let value = json!({ "9": { "images": [{ "filename": "c.png" }] } });
        let result = normalize_result(&value);
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].filename, "c.png");
    }

    #[test]
    fn skips_malformed_artifacts_silently() {
        let value = json!({ "images": [{ "subfolder": "x" }, { "filename": "" }, { "filename": "ok.png" }] });
        let result = normalize_result(&value);
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].filename, "ok.png");
    }

    #[test]
    fn idempotent_on_its_own_output() {
        let value = json!({ "images": [{ "filename": "a.png" }] });
        let once = normalize_result(&value);
        let again_input = serde_json::to_value(&once).unwrap();
        let twice = normalize_result(&again_input);
        assert_eq!(once, twice);
    }
}
