//! The UI graph: the authoring representation the compiler consumes.
//!
//! Grounded on the node/link shapes read throughout
//! `original_source/app/services/{comfy_prompt_builder,comfy_prompt_builder_v2,
//! workflow_mapper}.py`. Those files duck-type a `dict` at every turn (`node
//! ["inputs"]` is sometimes a list of port descriptors, sometimes a flat
//! field map); `spec.md` §9's design notes call for replacing that
//! feature-detection with an explicit tagged variant, which is what
//! [`NodeInputs`] is.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::CompileError;

pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeMode {
    Normal,
    Muted,
    Bypass,
}

impl NodeMode {
    fn from_token(token: Option<i64>) -> Self {
        match token {
            Some(2) => NodeMode::Muted,
            Some(4) => NodeMode::Bypass,
            _ => NodeMode::Normal,
        }
    }
}

/// One input port descriptor from a UI-style `node["inputs"]` list entry.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub port_type: Option<String>,
    /// Link id feeding this port, if connected.
    pub link: Option<i64>,
    /// Present (non-null) when the UI treats this port as a positional
    /// widget slot rather than a purely link-fed port.
    pub has_widget_meta: bool,
}

/// The shape of `node["inputs"]`, normalized into one of two variants
/// instead of being feature-detected at every write site.
#[derive(Debug, Clone)]
pub enum NodeInputs {
    /// UI-authored node: an ordered list of port descriptors, some of which
    /// double as positional widget slots.
    PortList(Vec<Port>),
    /// Already-compiled-ish node: a flat `field -> value` map.
    FieldMap(Map<String, Value>),
    None,
}

#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub output_type: Option<String>,
    pub links: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub class_type: String,
    pub mode: NodeMode,
    pub inputs: NodeInputs,
    pub widgets_values: Vec<Value>,
    pub outputs: Vec<NodeOutput>,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: i64,
    pub src_node: NodeId,
    pub src_slot: i64,
    pub dst_node: NodeId,
    pub dst_slot: i64,
    pub link_type: String,
}

/// A UI node/link graph, parsed leniently from its JSON authoring form.
///
/// `nodes` preserves UI authoring order (matters for widget/positional
/// alignment and for deterministic compiler output per I3).
#[derive(Debug, Clone)]
pub struct Graph {
    pub nodes: IndexMap<NodeId, Node>,
    pub links: BTreeMap<i64, Link>,
    pub extra_pnginfo: Option<Value>,
}

fn node_class_type(obj: &Map<String, Value>) -> Option<String> {
    obj.get("class_type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| obj.get("type").and_then(Value::as_str).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

fn parse_ports(value: &Value) -> Vec<Port> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let name = obj.get("name").and_then(Value::as_str)?.to_string();
            let port_type = obj.get("type").and_then(Value::as_str).map(str::to_string);
            let link = obj.get("link").and_then(Value::as_i64);
            let has_widget_meta = obj.get("widget").map(|w| !w.is_null()).unwrap_or(false);
            Some(Port {
                name,
                port_type,
                link,
                has_widget_meta,
            })
        })
        .collect()
}

fn parse_outputs(value: Option<&Value>) -> Vec<NodeOutput> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| {
            let obj = item.as_object();
            let output_type = obj
                .and_then(|o| o.get("type"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let links = obj
                .and_then(|o| o.get("links"))
                .and_then(Value::as_array)
                .map(|links| links.iter().filter_map(Value::as_i64).collect())
                .unwrap_or_default();
            NodeOutput { output_type, links }
        })
        .collect()
}

impl Graph {
    /// Parses a UI graph from its JSON authoring form.
    ///
    /// Missing `id`/`class_type` on a node is `InvalidGraph`, matching
    /// `ComfyPromptBuildError("Node missing 'id'")` /
    /// `Node {nid} missing 'type/class_type'` in
    /// `comfy_prompt_builder.py::build_prompt_from_ui_workflow`.
    pub fn parse(value: &Value) -> Result<Graph, CompileError> {
        let obj = value
            .as_object()
            .ok_or_else(|| CompileError::InvalidGraph("workflow must be a JSON object".into()))?;

        let raw_nodes = obj
            .get("nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| CompileError::InvalidGraph("workflow['nodes'] must be a list".into()))?;

        let mut nodes = IndexMap::new();
        for raw in raw_nodes {
            let node_obj = raw
                .as_object()
                .ok_or_else(|| CompileError::InvalidGraph("node must be an object".into()))?;

            let id = node_obj
                .get("id")
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .ok_or_else(|| CompileError::InvalidGraph("node missing 'id'".into()))?;

            let class_type = node_class_type(node_obj).ok_or_else(|| {
                CompileError::InvalidGraph(format!("node {id} missing 'type'/'class_type'"))
            })?;

            let mode = NodeMode::from_token(node_obj.get("mode").and_then(Value::as_i64));

            let inputs = match node_obj.get("inputs") {
                Some(Value::Array(_)) => NodeInputs::PortList(parse_ports(&node_obj["inputs"])),
                Some(Value::Object(map)) => NodeInputs::FieldMap(map.clone()),
                _ => NodeInputs::None,
            };

            let widgets_values = node_obj
                .get("widgets_values")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let outputs = parse_outputs(node_obj.get("outputs"));
            let properties = node_obj
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            nodes.insert(
                id.clone(),
                Node {
                    id,
                    class_type,
                    mode,
                    inputs,
                    widgets_values,
                    outputs,
                    properties,
                },
            );
        }

        let mut links = BTreeMap::new();
        if let Some(raw_links) = obj.get("links").and_then(Value::as_array) {
            for raw in raw_links {
                let Some(entry) = raw.as_array() else {
                    continue;
                };
                if entry.len() < 5 {
                    continue;
                }
                let (Some(id), Some(src_node_num)) = (entry[0].as_i64(), entry.get(1)) else {
                    continue;
                };
                let src_node = match src_node_num {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let Some(src_slot) = entry[2].as_i64() else {
                    continue;
                };
                let dst_node = match &entry[3] {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let Some(dst_slot) = entry[4].as_i64() else {
                    continue;
                };
                let link_type = entry
                    .get(5)
                    .and_then(Value::as_str)
                    .unwrap_or("*")
                    .to_string();

                links.insert(
                    id,
                    Link {
                        id,
                        src_node,
                        src_slot,
                        dst_node,
                        dst_slot,
                        link_type,
                    },
                );
            }
        }

        let extra_pnginfo = obj.get("extra_pnginfo").cloned();

        Ok(Graph {
            nodes,
            links,
            extra_pnginfo,
        })
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_graph() {
        let value = json!({
            "nodes": [
                {"id": 6, "type": "CLIPTextEncode", "mode": 0, "widgets_values": ["hello"]},
                {"id": 9, "type": "SaveImage", "mode": 0, "inputs": [{"name": "images", "link": 1}]}
            ],
            "links": [[1, 6, 0, 9, 0, "IMAGE"]]
        });

        let graph = Graph::parse(&value).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.node("6").unwrap().class_type, "CLIPTextEncode");
        assert_eq!(graph.links.get(&1).unwrap().dst_node, "9");
    }

    #[test]
    fn rejects_node_missing_class_type() {
        let value = json!({"nodes": [{"id": 1}]});
        assert!(matches!(
            Graph::parse(&value),
            Err(CompileError::InvalidGraph(_))
        ));
    }
}
