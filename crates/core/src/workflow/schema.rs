//! Typed input schema derived from a workflow template.
//!
//! Each named input becomes an [`InputField`] whose [`FieldKind`] is decided
//! from the node's class type and its `_meta.options` hints. The schema can
//! be exported as JSON Schema for UIs and is used to validate and coerce
//! caller payloads before a template is populated.

use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{parse_workflow, portable_path, WorkflowNode, INPUT_VALUE_CLASS, PATH_INPUT_CLASSES};
use crate::error::CoreError;

/// Option keys that mark a value input as numeric.
const NUMERIC_OPTION_KEYS: &[&str] = &["min", "max", "round", "step", "precision"];

/// JSON Schema dialect emitted by [`InputSchema::to_json_schema`].
const JSON_SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// JSON type of a literal default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
    Null,
}

impl LiteralType {
    /// Runtime type of a JSON value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Number(n) if n.is_f64() => Self::Float,
            Value::Number(_) => Self::Integer,
            Value::Bool(_) => Self::Boolean,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            Value::Null => Self::Null,
        }
    }

    fn json_schema_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        }
    }
}

/// Kind of an input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// A filesystem path (file or image inputs).
    Path,
    /// One of a closed set of literal values.
    Choice { values: Vec<Value> },
    /// Integer with optional inclusive bounds.
    Integer { min: Option<f64>, max: Option<f64> },
    /// Floating-point number with optional inclusive bounds.
    Float { min: Option<f64>, max: Option<f64> },
    /// Any value of the given JSON type.
    Literal { ty: LiteralType },
}

/// A single named input of a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputField {
    pub name: String,
    pub node_id: String,
    pub kind: FieldKind,
    /// Value baked into the template. `None` makes the field required.
    pub default: Option<Value>,
}

impl InputField {
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

/// Typed schema of every input of a workflow template, in template order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputSchema {
    pub fields: Vec<InputField>,
}

// ---------------------------------------------------------------------------
// Schema generation
// ---------------------------------------------------------------------------

/// Derive the input schema of a workflow template.
///
/// Fails with [`CoreError::UnsupportedNode`] when an input node has a class
/// type the generator does not know; such a template cannot be served.
pub fn generate_schema(workflow: &Value) -> Result<InputSchema, CoreError> {
    let parsed = parse_workflow(workflow)?;

    let fields = parsed
        .inputs
        .iter()
        .map(|(name, node)| input_field(name, node))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InputSchema { fields })
}

fn input_field(name: &str, node: &WorkflowNode) -> Result<InputField, CoreError> {
    let class_type = node.class_type.as_str();

    let (kind, default) = if PATH_INPUT_CLASSES.contains(&class_type) {
        (FieldKind::Path, None)
    } else if class_type == INPUT_VALUE_CLASS {
        let value = node.value().cloned().ok_or_else(|| {
            CoreError::Validation(format!("Input node '{}' has no input slot", node.id))
        })?;
        (value_field_kind(node, &value), Some(value))
    } else {
        return Err(CoreError::UnsupportedNode(class_type.to_string()));
    };

    Ok(InputField {
        name: name.to_string(),
        node_id: node.id.clone(),
        kind,
        default,
    })
}

fn value_field_kind(node: &WorkflowNode, value: &Value) -> FieldKind {
    let literal = FieldKind::Literal {
        ty: LiteralType::of(value),
    };

    let Some(options) = node.meta.options.as_ref().filter(|o| !o.is_empty()) else {
        return literal;
    };

    if let Some(values) = options.get("values").and_then(Value::as_array) {
        if !values.is_empty() {
            return FieldKind::Choice {
                values: values.clone(),
            };
        }
    }

    if NUMERIC_OPTION_KEYS.iter().any(|k| options.contains_key(*k)) {
        let min = options.get("min").and_then(Value::as_f64);
        let max = options.get("max").and_then(Value::as_f64);
        return if is_integer_kind(options, value) {
            FieldKind::Integer { min, max }
        } else {
            FieldKind::Float { min, max }
        };
    }

    literal
}

/// Integer iff `round >= 1`. Without a numeric `round`, a fractional
/// `step`, a positive `precision` or a float value makes the field a float.
fn is_integer_kind(options: &Map<String, Value>, value: &Value) -> bool {
    if let Some(round) = options.get("round").and_then(Value::as_f64) {
        return round >= 1.0;
    }

    let step_is_fractional = options
        .get("step")
        .and_then(Value::as_f64)
        .is_some_and(|s| s.fract() != 0.0);
    let has_precision = options
        .get("precision")
        .and_then(Value::as_f64)
        .is_some_and(|p| p > 0.0);

    !(step_is_fractional || has_precision || value.is_f64())
}

// ---------------------------------------------------------------------------
// Export and validation
// ---------------------------------------------------------------------------

impl InputSchema {
    /// Render the schema as a JSON Schema object document.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut prop = match &field.kind {
                FieldKind::Path => json!({"type": "string", "x-cpack-kind": "path"}),
                FieldKind::Choice { values } => json!({"enum": values}),
                FieldKind::Integer { min, max } => bounded("integer", *min, *max),
                FieldKind::Float { min, max } => bounded("number", *min, *max),
                FieldKind::Literal { ty } => json!({"type": ty.json_schema_type()}),
            };
            if let (Some(obj), Some(default)) = (prop.as_object_mut(), &field.default) {
                obj.insert("default".to_string(), default.clone());
            }
            if field.required() {
                required.push(Value::String(field.name.clone()));
            }
            properties.insert(field.name.clone(), prop);
        }

        json!({
            "$schema": JSON_SCHEMA_DIALECT,
            "title": "ParsedWorkflowTemplate",
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Validate a caller payload and return the coerced input values.
    ///
    /// Missing optional fields take their template default, integral floats
    /// given for integer fields become integers, and path strings are
    /// rewritten with `/` separators. The result is ordered like the schema.
    pub fn validate(&self, payload: &Value) -> Result<Map<String, Value>, CoreError> {
        let schema = self.to_json_schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| CoreError::Validation(format!("Invalid input schema: {e}")))?;

        let errors: Vec<String> = validator
            .iter_errors(payload)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(CoreError::Validation(format!(
                "Input validation failed: {}",
                errors.join("; ")
            )));
        }

        let given = payload.as_object().cloned().unwrap_or_default();
        let mut values = Map::new();
        for field in &self.fields {
            let value = match (given.get(&field.name), &field.default) {
                (Some(v), _) => coerce(&field.kind, v.clone()),
                (None, Some(default)) => default.clone(),
                (None, None) => continue,
            };
            values.insert(field.name.clone(), value);
        }

        Ok(values)
    }
}

fn bounded(ty: &str, min: Option<f64>, max: Option<f64>) -> Value {
    let mut prop = json!({ "type": ty });
    if let Some(obj) = prop.as_object_mut() {
        if let Some(min) = min {
            obj.insert("minimum".to_string(), json!(min));
        }
        if let Some(max) = max {
            obj.insert("maximum".to_string(), json!(max));
        }
    }
    prop
}

fn coerce(kind: &FieldKind, value: Value) -> Value {
    match (kind, &value) {
        (FieldKind::Integer { .. }, Value::Number(n)) if n.is_f64() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| json!(f as i64))
            .unwrap_or(value),
        (FieldKind::Path, Value::String(s)) => Value::String(portable_path(Path::new(s))),
        _ => value,
    }
}
