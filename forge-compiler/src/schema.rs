//! Schema Catalog types: a worker's `class_type -> input schema` description,
//! and the coercion helpers that use it.
//!
//! Grounded on `original_source/app/services/comfy_prompt_validate.py`
//! (`_schema_inputs_for_class`, `_coerce_value_to_type`, `_combo_fix_value`,
//! `_meta_default`). The wire shape is ComfyUI's own `/object_info`: each
//! schema entry is a 2-element JSON array `[type_or_choices, meta]`.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

/// One schema entry for a single input field: either a primitive type with
/// metadata, or an enumeration (`COMBO`) whose allowed values are its first
/// element.
#[derive(Debug, Clone)]
pub enum SchemaEntry {
    Primitive { type_name: String, meta: Value },
    Combo { choices: Vec<Value>, meta: Value },
}

impl SchemaEntry {
    pub fn from_value(value: &Value) -> Option<SchemaEntry> {
        let arr = value.as_array()?;
        let head = arr.first()?;
        let meta = arr.get(1).cloned().unwrap_or(Value::Null);
        if let Some(choices) = head.as_array() {
            Some(SchemaEntry::Combo {
                choices: choices.clone(),
                meta,
            })
        } else {
            Some(SchemaEntry::Primitive {
                type_name: head.as_str()?.to_uppercase(),
                meta,
            })
        }
    }

    pub fn default_value(&self) -> Option<Value> {
        let meta = match self {
            SchemaEntry::Primitive { meta, .. } => meta,
            SchemaEntry::Combo { meta, .. } => meta,
        };
        meta.as_object().and_then(|m| m.get("default")).cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassSchema {
    pub required: IndexMap<String, SchemaEntry>,
    pub optional: IndexMap<String, SchemaEntry>,
}

impl ClassSchema {
    /// Optional wins over required on key collision, matching
    /// `_schema_inputs_for_class`'s `merged.update(required);
    /// merged.update(optional)` — the second `update` call overwrites
    /// whatever the first one set.
    pub fn field(&self, name: &str) -> Option<&SchemaEntry> {
        self.optional.get(name).or_else(|| self.required.get(name))
    }

    pub fn from_object_info_entry(value: &Value) -> ClassSchema {
        let mut schema = ClassSchema::default();
        let Some(input) = value.as_object().and_then(|o| o.get("input")) else {
            return schema;
        };
        if let Some(required) = input.get("required").and_then(Value::as_object) {
            for (k, v) in required {
                if let Some(entry) = SchemaEntry::from_value(v) {
                    schema.required.insert(k.clone(), entry);
                }
            }
        }
        if let Some(optional) = input.get("optional").and_then(Value::as_object) {
            for (k, v) in optional {
                if let Some(entry) = SchemaEntry::from_value(v) {
                    schema.optional.insert(k.clone(), entry);
                }
            }
        }
        schema
    }
}

/// `class_type -> ClassSchema`, as fetched from a worker's `/object_info`.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    pub classes: HashMap<String, ClassSchema>,
}

impl SchemaCatalog {
    pub fn from_object_info(value: &Value) -> SchemaCatalog {
        let mut classes = HashMap::new();
        if let Some(obj) = value.as_object() {
            for (class_type, entry) in obj {
                classes.insert(class_type.clone(), ClassSchema::from_object_info_entry(entry));
            }
        }
        SchemaCatalog { classes }
    }

    pub fn class(&self, class_type: &str) -> Option<&ClassSchema> {
        self.classes.get(class_type)
    }
}

/// Matches a value against a `COMBO` enumeration: exact match, then basename
/// match (for path-shaped values such as `"Kontext\\file.safetensors"`),
/// else `None`. Ports `_combo_fix_value`.
pub fn combo_fix_value(choices: &[Value], value: &Value) -> Option<Value> {
    if choices.contains(value) {
        return Some(value.clone());
    }
    let Value::String(s) = value else {
        return None;
    };
    if s.is_empty() {
        return None;
    }
    let base = s.replace('\\', "/");
    let base = base.rsplit('/').next().unwrap_or(&base);
    for choice in choices {
        if let Value::String(c) = choice {
            if c == base {
                return Some(choice.clone());
            }
            let c_base = c.replace('\\', "/");
            let c_base = c_base.rsplit('/').next().unwrap_or(&c_base);
            if c_base == base {
                return Some(choice.clone());
            }
        }
    }
    None
}

/// Coerces `value` to `type_name`'s primitive shape. Empty string / null
/// substitutes `meta`'s default if present (mirrors
/// `_coerce_value_to_type`'s empty-value branch). On parse failure, callers
/// fall back to the schema default per §4.B step 7.
pub fn coerce_primitive(type_name: &str, meta: &Value, value: &Value) -> Result<Value, ()> {
    let is_empty = matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty());
    if is_empty {
        if let Some(default) = meta.as_object().and_then(|m| m.get("default")) {
            return Ok(default.clone());
        }
        return Ok(value.clone());
    }

    match type_name {
        "INT" => value_as_i64(value).map(|v| Value::from(v)).ok_or(()),
        "FLOAT" => value_as_f64(value).map(Value::from).ok_or(()),
        "BOOLEAN" => Ok(Value::Bool(value_as_bool(value))),
        _ => Ok(value.clone()),
    }
}

pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        _ => !matches!(value, Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_combo_entry() {
        let value = json!([["a", "b"], {"default": "a"}]);
        let entry = SchemaEntry::from_value(&value).unwrap();
        assert!(matches!(entry, SchemaEntry::Combo { .. }));
        assert_eq!(entry.default_value(), Some(json!("a")));
    }

    #[test]
    fn combo_fix_matches_basename() {
        let choices = vec![json!("model.safetensors")];
        let fixed = combo_fix_value(&choices, &json!("Kontext\\model.safetensors"));
        assert_eq!(fixed, Some(json!("model.safetensors")));
    }

    #[test]
    fn combo_fix_none_when_unmatched() {
        let choices = vec![json!("a")];
        assert_eq!(combo_fix_value(&choices, &json!("z")), None);
    }

    #[test]
    fn coerces_int_and_falls_back_to_default_on_empty() {
        let meta = json!({"default": 20});
        assert_eq!(
            coerce_primitive("INT", &meta, &json!("5")).unwrap(),
            json!(5)
        );
        assert_eq!(
            coerce_primitive("INT", &meta, &json!("")).unwrap(),
            json!(20)
        );
    }

    #[test]
    fn coerces_boolean_variants() {
        let meta = json!({});
        assert_eq!(coerce_primitive("BOOLEAN", &meta, &json!("yes")), Ok(Value::Bool(true)));
        assert_eq!(coerce_primitive("BOOLEAN", &meta, &json!(0)), Ok(Value::Bool(false)));
    }
}
