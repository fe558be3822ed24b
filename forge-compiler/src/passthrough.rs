//! Pass-through resolution: chasing a link back through `switch`/`bypass`
//! nodes to its real source, and discovering which nodes are reachable from
//! the graph's declared outputs.
//!
//! Grounded on `original_source/app/services/sanitize_comfy_prompt.py`'s
//! `resolve_ref`, which is recursive and falls back to the identity
//! `(node_id, slot)` for any node that isn't itself a switch/bypass hop.

use std::collections::{HashSet, VecDeque};

use crate::error::CompileError;
use crate::graph::{Graph, Node, NodeId, NodeInputs, NodeMode, Port};
use crate::sanitize::{is_switch_class, is_ui_only_class, BYPASS_SAFE_CLASS_TYPES};

/// Follows `(node_id, slot)` back through any switch/bypass hops to the
/// node/slot that actually produces the value. Returns `Ok(None)` when the
/// chain terminates at a muted or UI-only node (the reference is dead).
pub fn resolve_ref(
    graph: &Graph,
    node_id: &str,
    slot: i64,
) -> Result<Option<(NodeId, i64)>, CompileError> {
    let mut visiting = HashSet::new();
    resolve_ref_inner(graph, node_id, slot, &mut visiting)
}

fn resolve_ref_inner(
    graph: &Graph,
    node_id: &str,
    slot: i64,
    visiting: &mut HashSet<NodeId>,
) -> Result<Option<(NodeId, i64)>, CompileError> {
    let Some(node) = graph.node(node_id) else {
        return Ok(None);
    };

    if node.mode == NodeMode::Muted || is_ui_only_class(&node.class_type) {
        return Ok(None);
    }

    let is_bypass_hop = node.mode == NodeMode::Bypass || BYPASS_SAFE_CLASS_TYPES.contains(&node.class_type.as_str());
    let is_switch_hop = is_switch_class(&node.class_type);

    if !is_bypass_hop && !is_switch_hop {
        return Ok(Some((node.id.clone(), slot)));
    }

    if !visiting.insert(node_id.to_string()) {
        return Err(CompileError::PassThroughCycle(node_id.to_string()));
    }

    let branch = if is_switch_hop {
        first_switch_branch(graph, node)
    } else {
        bypass_branch(graph, node, slot)?
    };

    let result = match branch {
        Some((src_node, src_slot)) => {
            let deeper = resolve_ref_inner(graph, &src_node, src_slot, visiting)?;
            Ok(deeper.or(Some((src_node, src_slot))))
        }
        None => Ok(None),
    };

    visiting.remove(node_id);
    result
}

/// The first connected `any_NN` input (sorted by name), falling back to the
/// first connected port in authoring order.
fn first_switch_branch(graph: &Graph, node: &Node) -> Option<(NodeId, i64)> {
    let NodeInputs::PortList(ports) = &node.inputs else {
        return None;
    };
    let mut any_candidates: Vec<&Port> = ports
        .iter()
        .filter(|p| p.link.is_some() && p.name.starts_with("any_"))
        .collect();
    any_candidates.sort_by(|a, b| a.name.cmp(&b.name));

    let port = any_candidates
        .into_iter()
        .next()
        .or_else(|| ports.iter().find(|p| p.link.is_some()))?;

    port_source(graph, port)
}

/// The connected input port whose declared type matches the bypassed
/// node's requested output slot type. No type information on the output
/// slot falls back to the first connected port; a known type with no
/// matching connected port is a hard compile error (strict pass-through
/// type-matching).
fn bypass_branch(graph: &Graph, node: &Node, slot: i64) -> Result<Option<(NodeId, i64)>, CompileError> {
    let NodeInputs::PortList(ports) = &node.inputs else {
        return Ok(None);
    };
    let connected: Vec<&Port> = ports.iter().filter(|p| p.link.is_some()).collect();
    if connected.is_empty() {
        return Ok(None);
    }

    let expected_type = node
        .outputs
        .get(slot as usize)
        .and_then(|o| o.output_type.as_deref());

    let port = match expected_type {
        Some(expected) => match connected.iter().find(|p| p.port_type.as_deref() == Some(expected)) {
            Some(p) => *p,
            None => {
                return Err(CompileError::TypeMismatchThroughBypass {
                    node_id: node.id.clone(),
                    expected: expected.to_string(),
                    found: connected[0]
                        .port_type
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                })
            }
        },
        None => connected[0],
    };

    Ok(port_source(graph, port))
}

fn port_source(graph: &Graph, port: &Port) -> Option<(NodeId, i64)> {
    let link = graph.links.get(&port.link?)?;
    Some((link.src_node.clone(), link.src_slot))
}

/// Active-node discovery: reverse BFS from `roots`, following only the
/// chosen branch through switch nodes (not every connected `any_NN` input)
/// and skipping muted nodes entirely.
pub fn discover_active(graph: &Graph, roots: &[NodeId]) -> HashSet<NodeId> {
    let mut visited = HashSet::new();
    let mut queue: VecDeque<NodeId> = roots.iter().cloned().collect();

    while let Some(node_id) = queue.pop_front() {
        if visited.contains(&node_id) {
            continue;
        }
        let Some(node) = graph.node(&node_id) else {
            continue;
        };
        if node.mode == NodeMode::Muted {
            continue;
        }
        visited.insert(node_id.clone());

        let NodeInputs::PortList(ports) = &node.inputs else {
            continue;
        };

        if is_switch_class(&node.class_type) {
            if let Some((src, _slot)) = first_switch_branch(graph, node) {
                queue.push_back(src);
            }
            continue;
        }

        for port in ports {
            if let Some(link_id) = port.link {
                if let Some(link) = graph.links.get(&link_id) {
                    queue.push_back(link.src_node.clone());
                }
            }
        }
    }

    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph_with_bypass_chain() -> Graph {
        Graph::parse(&json!({
            "nodes": [
                {"id": 1, "type": "CheckpointLoaderSimple", "mode": 0, "outputs": [{"type": "MODEL", "links": [10]}]},
                {"id": 2, "type": "LoraLoader", "mode": 4,
                 "inputs": [{"name": "model", "type": "MODEL", "link": 10}],
                 "outputs": [{"type": "MODEL", "links": [20]}]},
                {"id": 3, "type": "KSampler", "mode": 0,
                 "inputs": [{"name": "model", "type": "MODEL", "link": 20}]}
            ],
            "links": [
                [10, "1", 0, "2", 0, "MODEL"],
                [20, "2", 0, "3", 0, "MODEL"]
            ]
        }))
        .unwrap()
    }

    #[test]
    fn resolves_through_bypass_node() {
        let graph = graph_with_bypass_chain();
        let resolved = resolve_ref(&graph, "2", 0).unwrap();
        assert_eq!(resolved, Some(("1".to_string(), 0)));
    }

    #[test]
    fn active_discovery_skips_muted_branch() {
        let graph = Graph::parse(&json!({
            "nodes": [
                {"id": 1, "type": "CLIPTextEncode", "mode": 0},
                {"id": 2, "type": "CLIPTextEncode", "mode": 2},
                {"id": 9, "type": "SaveImage", "mode": 0,
                 "inputs": [{"name": "images", "type": "IMAGE", "link": 1}]}
            ],
            "links": [[1, "1", 0, "9", 0, "IMAGE"]]
        }))
        .unwrap();
        let active = discover_active(&graph, &["9".to_string()]);
        assert!(active.contains("1"));
        assert!(!active.contains("2"));
    }
}
