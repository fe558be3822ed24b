//! The Spec: the declarative description of a Workflow's user-facing inputs
//! and their bindings into the UI graph.
//!
//! Grounded on `original_source/app/schemas/workflow_spec_v2.py`
//! (`WorkflowSpecV2`/`*InputSpec`/`BindingSpec`) and validated the way
//! `original_source/app/services/workflow_spec_validator.py::validate_workflow_spec`
//! does.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    View,
    Hidden,
    NoView,
}

impl Default for ViewMode {
    fn default() -> Self {
        ViewMode::View
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    Bool,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub node_id: String,
    pub field: String,
    #[serde(default)]
    pub map: Option<HashMap<String, Value>>,
}

impl Binding {
    pub fn key(&self) -> (String, String) {
        (self.node_id.clone(), self.field.clone())
    }

    /// Resolves the concrete value for `mode` through `map`, if present.
    /// Per §4.B: "If `binding.map[mode]` is defined, that overrides; it
    /// supplies the concrete value."
    pub fn mapped_value(&self, mode: &str) -> Option<Result<Value, CompileError>> {
        let map = self.map.as_ref()?;
        match map.get(mode) {
            Some(v) => Some(Ok(v.clone())),
            None => Some(Err(CompileError::InvalidModeForKey {
                mode: mode.to_string(),
                key: self.field.clone(),
            })),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextInputSpec {
    pub key: String,
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub view: ViewMode,
    pub binding: Option<Binding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamInputSpec {
    pub key: String,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub choices: Option<Vec<Value>>,
    #[serde(default)]
    pub view: ViewMode,
    #[serde(default)]
    pub name: Option<String>,
    pub binding: Option<Binding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInputSpec {
    pub key: String,
    pub label: Option<String>,
    #[serde(default)]
    pub modes: Option<Vec<String>>,
    pub binding: Option<Binding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskInputSpec {
    pub key: String,
    pub label: Option<String>,
    pub depends_on: String,
    #[serde(default)]
    pub modes: Option<Vec<String>>,
    pub binding: Option<Binding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputsSpec {
    #[serde(default)]
    pub text: Vec<TextInputSpec>,
    #[serde(default)]
    pub params: Vec<ParamInputSpec>,
    #[serde(default)]
    pub images: Vec<ImageInputSpec>,
    #[serde(default)]
    pub mask: Option<MaskInputSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeSpec {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaSpec {
    pub title: String,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBinding {
    pub node_id: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub key: String,
    #[serde(rename = "type")]
    pub output_type: String,
    pub binding: OutputBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    #[serde(default = "default_spec_version")]
    pub version: String,
    pub meta: MetaSpec,
    pub modes: Vec<ModeSpec>,
    #[serde(default)]
    pub inputs: InputsSpec,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

fn default_spec_version() -> String {
    "2.0".to_string()
}

impl Spec {
    /// The mode in effect when the caller doesn't name one: the sole mode if
    /// there's exactly one, else the literal `"default"`.
    pub fn default_mode(&self) -> &str {
        match self.modes.as_slice() {
            [single] => &single.id,
            _ => "default",
        }
    }

    /// Validates the cross-field invariants `workflow_spec_validator.py`
    /// enforces: at least one mode, image-mode references resolve, and a
    /// mask's `depends_on` names a real image input key.
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.modes.is_empty() {
            return Err(CompileError::InvalidGraph(
                "spec must declare at least one mode".into(),
            ));
        }

        let mode_ids: std::collections::HashSet<&str> =
            self.modes.iter().map(|m| m.id.as_str()).collect();

        for img in &self.inputs.images {
            if let Some(modes) = &img.modes {
                for m in modes {
                    if !mode_ids.contains(m.as_str()) {
                        return Err(CompileError::InvalidGraph(format!(
                            "unknown mode '{m}' in image input '{}'",
                            img.key
                        )));
                    }
                }
            }
        }

        if let Some(mask) = &self.inputs.mask {
            let known = self.inputs.images.iter().any(|i| i.key == mask.depends_on);
            if !known {
                return Err(CompileError::InvalidGraph(format!(
                    "mask.depends_on '{}' does not reference a known image input",
                    mask.depends_on
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_spec() -> Spec {
        serde_json::from_value(json!({
            "version": "2.0",
            "meta": {"title": "t", "description": "d", "version": "1"},
            "modes": [{"id": "default", "label": "Default"}],
            "inputs": {
                "text": [{"key": "prompt", "binding": {"node_id": "6", "field": "widget_0"}}],
                "images": [{"key": "image_204", "binding": {"node_id": "204", "field": "widget_0"}}],
                "mask": {"key": "mask_204", "depends_on": "image_204", "binding": {"node_id": "204", "field": "widget_0"}}
            },
            "outputs": [{"key": "image", "type": "image", "binding": {"node_id": "9", "field": "images"}}]
        }))
        .unwrap()
    }

    #[test]
    fn validates_mask_depends_on() {
        sample_spec().validate().unwrap();
    }

    #[test]
    fn rejects_unknown_mask_dependency() {
        let mut spec = sample_spec();
        spec.inputs.mask.as_mut().unwrap().depends_on = "nope".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn default_mode_is_sole_mode() {
        assert_eq!(sample_spec().default_mode(), "default");
    }
}
