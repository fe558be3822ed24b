//! Class-type taxonomy and the final sanitize pass over an executable
//! prompt-graph. Grounded on
//! `original_source/app/services/sanitize_comfy_prompt.py`
//! (`sanitize_prompt_for_comfy`) and the Florence2 adapter fix duplicated in
//! both that file and `comfy_prompt_builder_v2.py::_apply_florence2_model_override`.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// Node classes that produce a final artifact; reverse BFS for active-node
/// discovery starts here (§4.B step 2).
pub const OUTPUT_CLASS_TYPES: &[&str] = &["SaveImage", "PreviewImage"];

/// Multi-input nodes resolved to their first connected `any_NN` branch.
pub const SWITCH_CLASS_TYPES: &[&str] = &["Any Switch (rgthree)"];

/// Purely cosmetic/authoring nodes dropped from the executable graph.
pub const UI_ONLY_CLASS_TYPES: &[&str] = &[
    "Note",
    "MarkdownNote",
    "Label (rgthree)",
    "Fast Groups Muter (rgthree)",
    "Image Comparer (rgthree)",
];

/// Optimization nodes that are bypass-unrolled even outside of UI bypass
/// mode, because they're known to fail under API execution.
pub const BYPASS_SAFE_CLASS_TYPES: &[&str] = &["PathchSageAttentionKJ"];

const FLORENCE2_CLASS_TYPE: &str = "DownloadAndLoadFlorence2Model";

/// Normalizes `extra_pnginfo` to the dict shape some custom nodes expect,
/// folding a bare `dict` into a one-element list. Ports the `isinstance`
/// branch in `sanitize_prompt_for_comfy` step 0 (which does the opposite
/// direction: dict -> `[dict]`); this compiler keeps the `dict` shape as
/// canonical per §4.B step 7 (`extra_pnginfo` normalized to a single dict)
/// and normalizes lists down to their first element instead.
pub fn normalize_extra_pnginfo(value: Option<Value>) -> Option<Value> {
    match value? {
        Value::Object(map) => Some(Value::Object(map)),
        Value::Array(mut items) if !items.is_empty() => match items.remove(0) {
            Value::Object(map) => Some(Value::Object(map)),
            _ => None,
        },
        _ => None,
    }
}

/// Removes a known model loader's adapter field when it's empty-ish, per
/// §4.D: "if an adapter field is empty-ish, remove the key entirely."
/// Ports the `lora` cleanup in `sanitize_comfy_prompt.py` step 3/4.
pub fn strip_empty_adapter_fields(prompt: &mut Map<String, Value>) {
    for node in prompt.values_mut() {
        let Some(node_obj) = node.as_object_mut() else {
            continue;
        };
        if node_obj.get("class_type").and_then(Value::as_str) != Some(FLORENCE2_CLASS_TYPE) {
            continue;
        }
        let Some(inputs) = node_obj.get_mut("inputs").and_then(Value::as_object_mut) else {
            continue;
        };
        let is_empty = match inputs.get("lora") {
            Some(Value::Null) => true,
            Some(Value::Bool(false)) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            _ => false,
        };
        if is_empty {
            inputs.remove("lora");
        }
    }
}

/// `_apply_florence2_model_override`: if an adapter repo id was placed in
/// `lora`, swap it into `model` and blank `lora` so API execution doesn't
/// try to download `adapter_config.json` for it.
pub fn apply_florence2_model_override(prompt: &mut Map<String, Value>) {
    for node in prompt.values_mut() {
        let Some(node_obj) = node.as_object_mut() else {
            continue;
        };
        if node_obj.get("class_type").and_then(Value::as_str) != Some(FLORENCE2_CLASS_TYPE) {
            continue;
        }
        let Some(inputs) = node_obj.get_mut("inputs").and_then(Value::as_object_mut) else {
            continue;
        };
        let lora_value = inputs.get("lora").and_then(Value::as_str).map(str::to_string);
        if let Some(lora) = lora_value {
            if !lora.trim().is_empty() {
                inputs.insert("model".to_string(), Value::String(lora));
                inputs.insert("lora".to_string(), Value::String(String::new()));
            }
        }
    }
}

/// A node class that the final prompt-graph must never contain.
pub fn is_dropped_class(class_type: &str) -> bool {
    UI_ONLY_CLASS_TYPES.contains(&class_type)
        || SWITCH_CLASS_TYPES.contains(&class_type)
        || BYPASS_SAFE_CLASS_TYPES.contains(&class_type)
}

pub fn is_switch_class(class_type: &str) -> bool {
    SWITCH_CLASS_TYPES.contains(&class_type)
}

pub fn is_ui_only_class(class_type: &str) -> bool {
    UI_ONLY_CLASS_TYPES.contains(&class_type)
}

pub fn is_bypass_safe_class(class_type: &str) -> bool {
    BYPASS_SAFE_CLASS_TYPES.contains(&class_type)
}

/// The graph-side equivalent of [`output_roots`]: output-class node ids read
/// straight off the UI graph, used to seed active-node discovery (§4.B
/// step 2) before any executable prompt exists yet.
pub fn output_roots_from_graph(graph: &crate::graph::Graph) -> Vec<String> {
    graph
        .nodes
        .values()
        .filter(|n| OUTPUT_CLASS_TYPES.contains(&n.class_type.as_str()))
        .map(|n| n.id.clone())
        .collect()
}

pub fn output_roots(prompt: &Map<String, Value>) -> HashSet<String> {
    prompt
        .iter()
        .filter(|(_, node)| {
            node.get("class_type")
                .and_then(Value::as_str)
                .map(|ct| OUTPUT_CLASS_TYPES.contains(&ct))
                .unwrap_or(false)
        })
        .map(|(id, _)| id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_list_extra_pnginfo_to_dict() {
        let value = json!([{"workflow": {}}]);
        assert_eq!(
            normalize_extra_pnginfo(Some(value)),
            Some(json!({"workflow": {}}))
        );
    }

    #[test]
    fn florence2_override_moves_lora_into_model() {
        let mut prompt = Map::new();
        prompt.insert(
            "1".to_string(),
            json!({"class_type": "DownloadAndLoadFlorence2Model", "inputs": {"lora": "some/adapter"}}),
        );
        apply_florence2_model_override(&mut prompt);
        let inputs = prompt["1"]["inputs"].as_object().unwrap();
        assert_eq!(inputs["model"], json!("some/adapter"));
        assert_eq!(inputs["lora"], json!(""));
    }

    #[test]
    fn strips_empty_adapter_field() {
        let mut prompt = Map::new();
        prompt.insert(
            "1".to_string(),
            json!({"class_type": "DownloadAndLoadFlorence2Model", "inputs": {"lora": ""}}),
        );
        strip_empty_adapter_fields(&mut prompt);
        assert!(!prompt["1"]["inputs"].as_object().unwrap().contains_key("lora"));
    }
}
