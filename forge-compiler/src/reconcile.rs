//! The compiler's binding-application and widget-reconciliation pipeline:
//! `compile()` is the single entry point for §4.B steps 1-7, plus the §4.D
//! sanitizer pass folded in at the end (belt-and-braces per that section).
//!
//! Grounded on `original_source/app/services/comfy_prompt_builder_v2.py`
//! (`build_prompt_from_ui_workflow`), which is the "v2" builder the spec
//! calls canonical; the catalog-free fallback mirrors
//! `comfy_prompt_builder.py`'s older positional-only path.

use indexmap::IndexMap;
use rand::{Rng, RngCore};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::error::CompileError;
use crate::graph::{Graph, Node, NodeId, NodeInputs, NodeMode, Port};
use crate::passthrough::{discover_active, resolve_ref};
use crate::sanitize::{
    apply_florence2_model_override, is_bypass_safe_class, is_switch_class, is_ui_only_class,
    normalize_extra_pnginfo, output_roots_from_graph, strip_empty_adapter_fields,
};
use crate::schema::{combo_fix_value, coerce_primitive, SchemaCatalog, SchemaEntry};
use crate::spec::{Binding, ParamType, Spec};

const SEED_MODE_TOKENS: &[&str] = &["randomize", "fixed", "increment", "decrement"];

/// Side-effecting seam for mask-into-alpha merging (§4.B step 4). Kept as an
/// injected trait so `compile()` itself stays a pure function of its inputs,
/// matching the teacher's preference for pushing I/O to the edges; tests
/// supply a fake, production wires `forge_compiler::mask` + a `FileStore`.
pub trait MaskMerger {
    fn merge(&self, base_path: &str, mask_path: &str) -> Result<String, CompileError>;
}

/// A `MaskMerger` that always fails; used when callers know a Workflow's
/// Spec has no `mask` input and don't want to wire a real merger.
pub struct NoMaskMerger;

impl MaskMerger for NoMaskMerger {
    fn merge(&self, _base_path: &str, _mask_path: &str) -> Result<String, CompileError> {
        Err(CompileError::MaskMerge(
            "no mask merger configured for this compile call".into(),
        ))
    }
}

pub struct CompileInput<'a> {
    pub graph: &'a Graph,
    pub spec: &'a Spec,
    pub schema: Option<&'a SchemaCatalog>,
    pub text_inputs: HashMap<String, String>,
    pub param_inputs: HashMap<String, Value>,
    pub uploaded_files: HashMap<String, String>,
    pub mode: String,
    /// Last seed used for this Workflow's `increment`/`decrement` modes, if
    /// known. See DESIGN.md's Open Question decision: the compiler takes
    /// this as an explicit input rather than persisting it itself.
    pub previous_seed: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub prompt: Map<String, Value>,
    pub extra_pnginfo: Option<Value>,
    pub uploaded_files: HashMap<String, String>,
    /// For every key still present in `uploaded_files`, the `(node_id, field)`
    /// it ended up at in `prompt` after widget-slot alignment resolved a
    /// `widget_N` binding to its schema-ordered name. Input Staging (§4.C)
    /// uses this to patch `prompt` with the worker-returned remote reference
    /// once the local bytes are uploaded, without re-deriving the alignment
    /// itself.
    pub file_bindings: HashMap<String, (NodeId, String)>,
}

/// Pending literal writes keyed by `(node_id, field)`, where `field` is
/// either `widget_N` or a named input field, exactly as `Binding.field` is
/// specified. Applied at named-input build time, after schema-aware widget
/// alignment resolves what "named field" a given widget slot corresponds to.
#[derive(Default)]
struct Overrides {
    widgets: HashMap<NodeId, Vec<Option<Value>>>,
    named: HashMap<NodeId, Map<String, Value>>,
}

impl Overrides {
    fn set(&mut self, node_id: &str, field: &str, value: Value) {
        if let Some(idx) = field.strip_prefix("widget_").and_then(|n| n.parse::<usize>().ok()) {
            let slots = self.widgets.entry(node_id.to_string()).or_default();
            if slots.len() <= idx {
                slots.resize(idx + 1, None);
            }
            slots[idx] = Some(value);
        } else {
            self.named
                .entry(node_id.to_string())
                .or_default()
                .insert(field.to_string(), value);
        }
    }

    fn widget(&self, node_id: &str, idx: usize) -> Option<&Value> {
        self.widgets.get(node_id)?.get(idx)?.as_ref()
    }

    fn named(&self, node_id: &str, field: &str) -> Option<&Value> {
        self.named.get(node_id)?.get(field)
    }
}

pub fn compile(
    input: CompileInput,
    rng: &mut dyn RngCore,
    mask_merger: &dyn MaskMerger,
) -> Result<CompileOutput, CompileError> {
    input.spec.validate()?;

    let graph = input.graph;
    let mode = if input.mode.is_empty() {
        input.spec.default_mode().to_string()
    } else {
        input.mode.clone()
    };

    let roots: Vec<NodeId> = output_roots_from_graph(graph);
    if roots.is_empty() {
        return Err(CompileError::InvalidGraph(
            "graph has no SaveImage/PreviewImage output node".into(),
        ));
    }
    let active = discover_active(graph, &roots);

    let protected: HashSet<(NodeId, String)> = input
        .spec
        .inputs
        .text
        .iter()
        .filter_map(|t| t.binding.as_ref().map(Binding::key))
        .collect();

    let mut overrides = Overrides::default();
    let mut uploaded_files = input.uploaded_files;

    apply_param_bindings(&input, &mode, &protected, graph, &mut overrides)?;
    apply_image_bindings(&input, &mode, &active, graph, &uploaded_files, &mut overrides)?;
    apply_mask_binding(&input, &mode, graph, &mut uploaded_files, mask_merger, &mut overrides)?;
    apply_text_bindings(&input, graph, &mut overrides)?;

    apply_seed_randomization(graph, &active, rng, input.previous_seed, &mut overrides);

    let mut prompt = Map::new();
    for (node_id, node) in graph.nodes.iter() {
        if !active.contains(node_id) || !should_emit(node) {
            continue;
        }
        let inputs = build_node_inputs(graph, node, &overrides, input.schema)?;
        prompt.insert(
            node_id.clone(),
            Value::Object(Map::from_iter([
                ("class_type".to_string(), Value::String(node.class_type.clone())),
                ("inputs".to_string(), Value::Object(inputs)),
            ])),
        );
    }

    apply_florence2_model_override(&mut prompt);
    strip_empty_adapter_fields(&mut prompt);

    let file_bindings = resolve_file_bindings(&input.spec, graph, &uploaded_files);

    Ok(CompileOutput {
        prompt,
        extra_pnginfo: normalize_extra_pnginfo(graph.extra_pnginfo.clone()),
        uploaded_files,
        file_bindings,
    })
}

/// Resolves each staged upload key still present in `uploaded_files` to the
/// `(node_id, field)` its value landed at in the final `prompt`, so callers
/// can patch in a remote reference post-upload without re-deriving
/// widget-slot alignment. A `widget_N` binding resolves to the Nth
/// unlinked port's name (the same count `build_node_inputs` uses); a named
/// binding passes through unchanged.
fn resolve_file_bindings(
    spec: &Spec,
    graph: &Graph,
    uploaded_files: &HashMap<String, String>,
) -> HashMap<String, (NodeId, String)> {
    let mut file_bindings = HashMap::new();

    let mut bindings: Vec<(&str, &Binding)> = spec
        .inputs
        .images
        .iter()
        .filter_map(|img| img.binding.as_ref().map(|b| (img.key.as_str(), b)))
        .collect();
    if let Some(mask) = &spec.inputs.mask {
        if let Some(b) = &mask.binding {
            bindings.push((mask.key.as_str(), b));
        }
    }

    for (key, binding) in bindings {
        if !uploaded_files.contains_key(key) {
            continue;
        }
        if let Some(field) = resolve_field_name(graph, &binding.node_id, &binding.field) {
            file_bindings.insert(key.to_string(), (binding.node_id.clone(), field));
        }
    }
    file_bindings
}

fn resolve_field_name(graph: &Graph, node_id: &str, field: &str) -> Option<String> {
    let node = graph.nodes.get(node_id)?;
    let Some(idx) = field.strip_prefix("widget_").and_then(|n| n.parse::<usize>().ok()) else {
        return Some(field.to_string());
    };
    match &node.inputs {
        NodeInputs::PortList(ports) => {
            let mut widget_idx = 0usize;
            for port in ports {
                if port.link.is_some() {
                    continue;
                }
                if widget_idx == idx {
                    return Some(port.name.clone());
                }
                widget_idx += 1;
            }
            None
        }
        NodeInputs::FieldMap(_) | NodeInputs::None => None,
    }
}

fn should_emit(node: &Node) -> bool {
    node.mode != NodeMode::Muted
        && node.mode != NodeMode::Bypass
        && !is_switch_class(&node.class_type)
        && !is_ui_only_class(&node.class_type)
        && !is_bypass_safe_class(&node.class_type)
}

fn require_node<'g>(graph: &'g Graph, node_id: &str, field: &str) -> Result<&'g Node, CompileError> {
    graph.node(node_id).ok_or_else(|| CompileError::BindingNotFound {
        node_id: node_id.to_string(),
        field: field.to_string(),
    })
}

fn coerce_param_value(
    param_type: ParamType,
    default: Option<&Value>,
    choices: Option<&[Value]>,
    raw: Option<&Value>,
) -> Value {
    let is_empty = match raw {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    };

    let mut value = if is_empty {
        default.cloned().unwrap_or(Value::Null)
    } else {
        let raw = raw.expect("checked non-empty above");
        match param_type {
            ParamType::Int => crate::schema::value_as_i64(raw)
                .map(Value::from)
                .unwrap_or_else(|| default.cloned().unwrap_or(Value::Null)),
            ParamType::Float => crate::schema::value_as_f64(raw)
                .map(Value::from)
                .unwrap_or_else(|| default.cloned().unwrap_or(Value::Null)),
            ParamType::Bool => Value::Bool(crate::schema::value_as_bool(raw)),
            ParamType::Text => raw.clone(),
        }
    };

    if let Some(choices) = choices {
        if !choices.is_empty() && !choices.contains(&value) {
            value = default.cloned().unwrap_or(value);
        }
    }

    value
}

fn apply_param_bindings(
    input: &CompileInput,
    mode: &str,
    protected: &HashSet<(NodeId, String)>,
    graph: &Graph,
    overrides: &mut Overrides,
) -> Result<(), CompileError> {
    for param in &input.spec.inputs.params {
        let Some(binding) = &param.binding else {
            continue;
        };
        if protected.contains(&binding.key()) {
            continue;
        }
        require_node(graph, &binding.node_id, &binding.field)?;

        let value = match binding.mapped_value(mode) {
            Some(result) => result?,
            None => coerce_param_value(
                param.param_type,
                param.default.as_ref(),
                param.choices.as_deref(),
                input.param_inputs.get(&param.key),
            ),
        };
        overrides.set(&binding.node_id, &binding.field, value);
    }
    Ok(())
}

fn apply_image_bindings(
    input: &CompileInput,
    mode: &str,
    active: &HashSet<NodeId>,
    graph: &Graph,
    uploaded_files: &HashMap<String, String>,
    overrides: &mut Overrides,
) -> Result<(), CompileError> {
    for img in &input.spec.inputs.images {
        if let Some(modes) = &img.modes {
            if !modes.iter().any(|m| m == mode) {
                continue;
            }
        }
        let Some(binding) = &img.binding else { continue };
        if !active.contains(&binding.node_id) {
            // Stale binding into a node no longer reachable from an output;
            // §4.B step 3 says these are dropped rather than surfaced.
            continue;
        }
        require_node(graph, &binding.node_id, &binding.field)?;

        let value = match binding.mapped_value(mode) {
            Some(result) => Some(result?),
            None => uploaded_files.get(&img.key).cloned().map(Value::String),
        };
        if let Some(value) = value {
            overrides.set(&binding.node_id, &binding.field, value);
        }
    }
    Ok(())
}

fn apply_mask_binding(
    input: &CompileInput,
    mode: &str,
    graph: &Graph,
    uploaded_files: &mut HashMap<String, String>,
    mask_merger: &dyn MaskMerger,
    overrides: &mut Overrides,
) -> Result<(), CompileError> {
    let Some(mask) = &input.spec.inputs.mask else {
        return Ok(());
    };
    if let Some(modes) = &mask.modes {
        if !modes.iter().any(|m| m == mode) {
            return Ok(());
        }
    }
    let Some(mask_binding) = &mask.binding else {
        return Ok(());
    };
    require_node(graph, &mask_binding.node_id, &mask_binding.field)?;

    let image_spec = input
        .spec
        .inputs
        .images
        .iter()
        .find(|i| i.key == mask.depends_on);
    let image_binding = image_spec.and_then(|i| i.binding.as_ref());

    let same_target = image_binding.map(|b| b.key()) == Some(mask_binding.key());

    if same_target {
        if let (Some(base_path), Some(mask_path)) =
            (uploaded_files.get(&mask.depends_on).cloned(), uploaded_files.get(&mask.key).cloned())
        {
            let merged = mask_merger.merge(&base_path, &mask_path)?;
            uploaded_files.insert(mask.depends_on.clone(), merged.clone());
            uploaded_files.remove(&mask.key);
            overrides.set(&mask_binding.node_id, &mask_binding.field, Value::String(merged));
        }
        // Neither file staged (nothing to merge) — leave whatever the image
        // binding already wrote in place.
        return Ok(());
    }

    let value = match mask_binding.mapped_value(mode) {
        Some(result) => Some(result?),
        None => uploaded_files.get(&mask.key).cloned().map(Value::String),
    };
    if let Some(value) = value {
        overrides.set(&mask_binding.node_id, &mask_binding.field, value);
    }
    Ok(())
}

fn apply_text_bindings(
    input: &CompileInput,
    graph: &Graph,
    overrides: &mut Overrides,
) -> Result<(), CompileError> {
    for text in &input.spec.inputs.text {
        let Some(binding) = &text.binding else { continue };
        require_node(graph, &binding.node_id, &binding.field)?;

        let raw = input.text_inputs.get(&text.key).cloned();
        let value = match raw {
            Some(v) => v,
            None => match &text.default {
                Some(default) => default.clone(),
                None => {
                    if text.required {
                        return Err(CompileError::BindingNotFound {
                            node_id: binding.node_id.clone(),
                            field: format!("missing required text input '{}'", text.key),
                        });
                    }
                    String::new()
                }
            },
        };
        overrides.set(&binding.node_id, &binding.field, Value::String(value));
    }
    Ok(())
}

/// Structural seed-bearing widget detection: a `seed` port paired with a
/// mode token (`randomize`/`fixed`/`increment`/`decrement`) either
/// immediately after it or, if it's the last port, as the trailing widget
/// value. Returns the token's position (within `widgets_values`) and value.
fn find_seed_mode_token(ports: &[Port], widgets_values: &[Value]) -> Option<(usize, usize, String)> {
    let widget_ports: Vec<(usize, &Port)> = ports
        .iter()
        .enumerate()
        .filter(|(_, p)| p.link.is_none())
        .collect();
    if widgets_values.len() != widget_ports.len() + 1 {
        return None;
    }
    let seed_pos = widget_ports.iter().position(|(_, p)| p.name == "seed")?;

    let token_slot = if seed_pos == widget_ports.len() - 1 {
        widgets_values.len() - 1
    } else {
        seed_pos + 1
    };
    let token = widgets_values.get(token_slot)?.as_str()?;
    if !SEED_MODE_TOKENS.contains(&token) {
        return None;
    }
    Some((seed_pos, token_slot, token.to_string()))
}

fn apply_seed_randomization(
    graph: &Graph,
    active: &HashSet<NodeId>,
    rng: &mut dyn RngCore,
    previous_seed: Option<i64>,
    overrides: &mut Overrides,
) {
    for (node_id, node) in graph.nodes.iter() {
        if !active.contains(node_id) {
            continue;
        }
        let NodeInputs::PortList(ports) = &node.inputs else {
            continue;
        };
        let Some((seed_widget_pos, _token_slot, token)) =
            find_seed_mode_token(ports, &node.widgets_values)
        else {
            continue;
        };

        let widget_ports: Vec<&Port> = ports.iter().filter(|p| p.link.is_none()).collect();
        // widgets_values up to (but excluding) the token line up 1:1 with
        // widget_ports for any position before the token; the value at
        // `seed_widget_pos` in the *original* widgets_values is still the
        // literal seed, since the token is inserted adjacent to, not before,
        // the seed slot in both supported layouts.
        let current_seed = node
            .widgets_values
            .get(seed_widget_pos)
            .and_then(Value::as_i64)
            .or(previous_seed)
            .unwrap_or(0);

        let new_seed = match token.as_str() {
            "randomize" => rng.random_range(0..=i64::MAX),
            "increment" => previous_seed.unwrap_or(current_seed).saturating_add(1).max(0),
            "decrement" => previous_seed.unwrap_or(current_seed).saturating_sub(1).max(0),
            _ => current_seed, // "fixed"
        };

        let seed_port_name = widget_ports[seed_widget_pos].name.clone();
        overrides.named.entry(node_id.clone()).or_default().insert(seed_port_name, Value::from(new_seed));
        // Record the widget slot too, for catalog-free compilation (no named
        // reconciliation happens there, so the positional value must carry
        // the new seed directly).
        overrides.set(node_id, &format!("widget_{seed_widget_pos}"), Value::from(new_seed));
    }
}

fn resolve_port_value(graph: &Graph, link_id: i64) -> Result<Option<Value>, CompileError> {
    let Some(link) = graph.links.get(&link_id) else {
        return Ok(None);
    };
    let resolved = resolve_ref(graph, &link.src_node, link.src_slot)?;
    Ok(resolved.map(|(src_node, src_slot)| Value::Array(vec![Value::String(src_node), Value::from(src_slot)])))
}

fn build_node_inputs(
    graph: &Graph,
    node: &Node,
    overrides: &Overrides,
    schema: Option<&SchemaCatalog>,
) -> Result<Map<String, Value>, CompileError> {
    let class_schema = schema.and_then(|s| s.class(&node.class_type));
    let mut inputs: IndexMap<String, Value> = IndexMap::new();

    match &node.inputs {
        NodeInputs::PortList(ports) => {
            let token = find_seed_mode_token(ports, &node.widgets_values);
            let token_slot = token.as_ref().map(|(_, slot, _)| *slot);

            let mut widget_idx = 0usize;
            for port in ports {
                if let Some(link_id) = port.link {
                    if let Some(resolved) = resolve_port_value(graph, link_id)? {
                        inputs.insert(port.name.clone(), resolved);
                    }
                    continue;
                }

                let value = if let Some(named) = overrides.named(&node.id, &port.name) {
                    named.clone()
                } else if let Some(widget) = overrides.widget(&node.id, widget_idx) {
                    widget.clone()
                } else {
                    let mut source_idx = widget_idx;
                    if let Some(slot) = token_slot {
                        if source_idx >= slot {
                            source_idx += 1;
                        }
                    }
                    node.widgets_values
                        .get(source_idx)
                        .cloned()
                        .unwrap_or(Value::Null)
                };
                inputs.insert(port.name.clone(), value);
                widget_idx += 1;
            }
        }
        NodeInputs::FieldMap(map) => {
            for (field, value) in map {
                inputs.insert(field.clone(), value.clone());
            }
        }
        NodeInputs::None => {}
    }

    if let Some(named_overrides) = overrides.named.get(&node.id) {
        for (field, value) in named_overrides {
            inputs.insert(field.clone(), value.clone());
        }
    }

    // §4.B step 7: coercion & default injection against the schema catalog,
    // for every field that isn't a link.
    if let Some(class_schema) = class_schema {
        for (field, value) in inputs.iter_mut() {
            if matches!(value, Value::Array(a) if a.len() == 2 && a[1].is_number()) {
                continue; // linked port: [node_id, slot]
            }
            let Some(entry) = class_schema.field(field) else {
                continue;
            };
            *value = coerce_against_schema(entry, value);
        }
    }

    let mut out = Map::new();
    for (k, v) in inputs {
        out.insert(k, v);
    }
    Ok(out)
}

fn coerce_against_schema(entry: &SchemaEntry, value: &Value) -> Value {
    match entry {
        SchemaEntry::Combo { choices, .. } => combo_fix_value(choices, value)
            .or_else(|| entry.default_value())
            .unwrap_or_else(|| value.clone()),
        SchemaEntry::Primitive { type_name, meta } => {
            coerce_primitive(type_name, meta, value).unwrap_or_else(|_| {
                entry.default_value().unwrap_or_else(|| value.clone())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Spec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn parse_spec(v: Value) -> Spec {
        serde_json::from_value(v).unwrap()
    }

    /// S1 — simple text-to-image.
    #[test]
    fn s1_text_binding_writes_widget_and_finalizes() {
        let graph = Graph::parse(&json!({
            "nodes": [
                {"id": 6, "type": "CLIPTextEncode", "mode": 0, "widgets_values": [""],
                 "inputs": [{"name": "text", "widget": {"name": "text"}}]},
                {"id": 9, "type": "SaveImage", "mode": 0,
                 "inputs": [{"name": "images", "type": "IMAGE", "link": 1}]}
            ],
            "links": [[1, "6", 0, "9", 0, "IMAGE"]]
        }))
        .unwrap();

        let spec = parse_spec(json!({
            "meta": {"title": "t", "description": "d", "version": "1"},
            "modes": [{"id": "default", "label": "Default"}],
            "inputs": {"text": [{"key": "prompt_6", "binding": {"node_id": "6", "field": "widget_0"}}]},
            "outputs": [{"key": "image", "type": "image", "binding": {"node_id": "9", "field": "images"}}]
        }));

        let input = CompileInput {
            graph: &graph,
            spec: &spec,
            schema: None,
            text_inputs: HashMap::from([("prompt_6".to_string(), "a red car".to_string())]),
            param_inputs: HashMap::new(),
            uploaded_files: HashMap::new(),
            mode: "default".to_string(),
            previous_seed: None,
        };

        let mut rng = StdRng::seed_from_u64(1);
        let out = compile(input, &mut rng, &NoMaskMerger).unwrap();
        assert_eq!(out.prompt["6"]["inputs"]["text"], json!("a red car"));
    }

    /// S2 — seed randomization via adjacent mode token.
    #[test]
    fn s2_randomizes_seed_and_drops_mode_token() {
        let graph = Graph::parse(&json!({
            "nodes": [
                {"id": 3, "type": "KSampler", "mode": 0,
                 "widgets_values": [42, "randomize", 20, 7.5, "euler", "normal", 1.0],
                 "inputs": [
                    {"name": "seed"},
                    {"name": "steps"},
                    {"name": "cfg"},
                    {"name": "sampler_name"},
                    {"name": "scheduler"},
                    {"name": "denoise"}
                 ]},
                {"id": 9, "type": "SaveImage", "mode": 0,
                 "inputs": [{"name": "images", "type": "IMAGE", "link": 1}]}
            ],
            "links": [[1, "3", 0, "9", 0, "IMAGE"]]
        }))
        .unwrap();

        let spec = parse_spec(json!({
            "meta": {"title": "t", "description": "d", "version": "1"},
            "modes": [{"id": "default", "label": "Default"}]
        }));

        let input = CompileInput {
            graph: &graph,
            spec: &spec,
            schema: None,
            text_inputs: HashMap::new(),
            param_inputs: HashMap::new(),
            uploaded_files: HashMap::new(),
            mode: "default".to_string(),
            previous_seed: None,
        };

        let mut rng = StdRng::seed_from_u64(7);
        let out = compile(input, &mut rng, &NoMaskMerger).unwrap();
        let seed = out.prompt["3"]["inputs"]["seed"].as_i64().unwrap();
        assert_ne!(seed, 42);
        // no stray mode token anywhere in the compiled inputs
        for (_, v) in out.prompt["3"]["inputs"].as_object().unwrap() {
            assert_ne!(v.as_str(), Some("randomize"));
        }
    }

    /// S3 — bypass pass-through.
    #[test]
    fn s3_bypass_rewrites_link_to_ultimate_source() {
        let graph = Graph::parse(&json!({
            "nodes": [
                {"id": "A", "type": "CheckpointLoaderSimple", "mode": 0,
                 "outputs": [{"type": "MODEL", "links": [10]}]},
                {"id": "B", "type": "LoraLoader", "mode": 4,
                 "inputs": [{"name": "model", "type": "MODEL", "link": 10}],
                 "outputs": [{"type": "MODEL", "links": [20]}]},
                {"id": "C", "type": "KSampler", "mode": 0,
                 "inputs": [{"name": "model", "type": "MODEL", "link": 20}]},
                {"id": "9", "type": "SaveImage", "mode": 0,
                 "inputs": [{"name": "images", "type": "IMAGE", "link": 30}]}
            ],
            "links": [
                [10, "A", 0, "B", 0, "MODEL"],
                [20, "B", 0, "C", 0, "MODEL"],
                [30, "C", 0, "9", 0, "IMAGE"]
            ]
        }))
        .unwrap();

        let spec = parse_spec(json!({
            "meta": {"title": "t", "description": "d", "version": "1"},
            "modes": [{"id": "default", "label": "Default"}]
        }));
        let input = CompileInput {
            graph: &graph,
            spec: &spec,
            schema: None,
            text_inputs: HashMap::new(),
            param_inputs: HashMap::new(),
            uploaded_files: HashMap::new(),
            mode: "default".to_string(),
            previous_seed: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let out = compile(input, &mut rng, &NoMaskMerger).unwrap();

        assert!(!out.prompt.contains_key("B"));
        assert_eq!(out.prompt["C"]["inputs"]["model"], json!(["A", 0]));
    }

    /// S4 — switch resolution.
    #[test]
    fn s4_switch_resolves_to_first_connected_any_branch() {
        let graph = Graph::parse(&json!({
            "nodes": [
                {"id": "X", "type": "CLIPTextEncode", "mode": 0,
                 "outputs": [{"type": "CONDITIONING", "links": [5]}]},
                {"id": "SW", "type": "Any Switch (rgthree)", "mode": 0,
                 "inputs": [
                    {"name": "any_01", "link": null},
                    {"name": "any_02", "type": "CONDITIONING", "link": 5}
                 ],
                 "outputs": [{"type": "CONDITIONING", "links": [6]}]},
                {"id": "9", "type": "SaveImage", "mode": 0,
                 "inputs": [{"name": "images", "type": "IMAGE", "link": 6}]}
            ],
            "links": [
                [5, "X", 0, "SW", 0, "CONDITIONING"],
                [6, "SW", 0, "9", 0, "IMAGE"]
            ]
        }))
        .unwrap();

        let spec = parse_spec(json!({
            "meta": {"title": "t", "description": "d", "version": "1"},
            "modes": [{"id": "default", "label": "Default"}]
        }));
        let input = CompileInput {
            graph: &graph,
            spec: &spec,
            schema: None,
            text_inputs: HashMap::new(),
            param_inputs: HashMap::new(),
            uploaded_files: HashMap::new(),
            mode: "default".to_string(),
            previous_seed: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let out = compile(input, &mut rng, &NoMaskMerger).unwrap();

        assert!(!out.prompt.contains_key("SW"));
        assert_eq!(out.prompt["9"]["inputs"]["images"], json!(["X", 0]));
    }

    /// I4 — protected bindings: params may never overwrite a text binding.
    #[test]
    fn i4_param_cannot_overwrite_protected_text_binding() {
        let graph = Graph::parse(&json!({
            "nodes": [
                {"id": 6, "type": "CLIPTextEncode", "mode": 0, "widgets_values": [""],
                 "inputs": [{"name": "text"}]},
                {"id": 9, "type": "SaveImage", "mode": 0,
                 "inputs": [{"name": "images", "type": "IMAGE", "link": 1}]}
            ],
            "links": [[1, "6", 0, "9", 0, "IMAGE"]]
        }))
        .unwrap();

        let spec = parse_spec(json!({
            "meta": {"title": "t", "description": "d", "version": "1"},
            "modes": [{"id": "default", "label": "Default"}],
            "inputs": {
                "text": [{"key": "prompt_6", "binding": {"node_id": "6", "field": "widget_0"}}],
                "params": [{"key": "sneaky", "type": "text", "binding": {"node_id": "6", "field": "widget_0"}}]
            }
        }));

        let input = CompileInput {
            graph: &graph,
            spec: &spec,
            schema: None,
            text_inputs: HashMap::from([("prompt_6".to_string(), "kept".to_string())]),
            param_inputs: HashMap::from([("sneaky".to_string(), json!("overwritten"))]),
            uploaded_files: HashMap::new(),
            mode: "default".to_string(),
            previous_seed: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let out = compile(input, &mut rng, &NoMaskMerger).unwrap();
        assert_eq!(out.prompt["6"]["inputs"]["text"], json!("kept"));
    }

    struct FakeMerger;
    impl MaskMerger for FakeMerger {
        fn merge(&self, base_path: &str, mask_path: &str) -> Result<String, CompileError> {
            Ok(format!("merged://{base_path}+{mask_path}"))
        }
    }

    /// S5/I5 — mask merged into alpha when binding targets coincide.
    #[test]
    fn s5_mask_merges_into_single_file_path() {
        let graph = Graph::parse(&json!({
            "nodes": [
                {"id": 204, "type": "LoadImage", "mode": 0, "widgets_values": [""],
                 "inputs": [{"name": "image"}]},
                {"id": 9, "type": "SaveImage", "mode": 0,
                 "inputs": [{"name": "images", "type": "IMAGE", "link": 1}]}
            ],
            "links": [[1, "204", 0, "9", 0, "IMAGE"]]
        }))
        .unwrap();

        let spec = parse_spec(json!({
            "meta": {"title": "t", "description": "d", "version": "1"},
            "modes": [{"id": "default", "label": "Default"}],
            "inputs": {
                "images": [{"key": "image_204", "binding": {"node_id": "204", "field": "widget_0"}}],
                "mask": {"key": "mask_204", "depends_on": "image_204", "binding": {"node_id": "204", "field": "widget_0"}}
            }
        }));

        let input = CompileInput {
            graph: &graph,
            spec: &spec,
            schema: None,
            text_inputs: HashMap::new(),
            param_inputs: HashMap::new(),
            uploaded_files: HashMap::from([
                ("image_204".to_string(), "A.png".to_string()),
                ("mask_204".to_string(), "M.png".to_string()),
            ]),
            mode: "default".to_string(),
            previous_seed: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let out = compile(input, &mut rng, &FakeMerger).unwrap();

        assert_eq!(out.prompt["204"]["inputs"]["image"], json!("merged://A.png+M.png"));
        assert!(!out.uploaded_files.contains_key("mask_204"));
        assert_eq!(out.uploaded_files.get("image_204"), Some(&"merged://A.png+M.png".to_string()));
    }
}
