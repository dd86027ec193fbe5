//! ComfyUI workflow template handling.
//!
//! A workflow template is the API-format export of a ComfyUI graph: a flat
//! JSON object mapping node id to `{class_type, inputs, _meta}`. Nodes whose
//! class type starts with `CPackInput` or `CPackOutput` mark the template's
//! public contract. This module parses that contract, derives a typed input
//! schema from it, fills a template for a run and collects the files a run
//! produced.

pub mod outputs;
pub mod parse;
pub mod populate;
pub mod schema;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

pub use outputs::{retrieve_outputs, OutputFiles, WorkflowOutputs};
pub use parse::{parse_workflow, ParsedWorkflow};
pub use populate::{output_prefix, populate_workflow};
pub use schema::{generate_schema, FieldKind, InputField, InputSchema, LiteralType};

// ---------------------------------------------------------------------------
// Node class types
// ---------------------------------------------------------------------------

/// Class type prefix of every input node.
pub const INPUT_CLASS_PREFIX: &str = "CPackInput";

/// Class type prefix of every output node.
pub const OUTPUT_CLASS_PREFIX: &str = "CPackOutput";

/// Generic value input (string, number, boolean, combo).
pub const INPUT_VALUE_CLASS: &str = "CPackInputValue";

/// File path input.
pub const INPUT_FILE_CLASS: &str = "CPackInputFile";

/// Image path input.
pub const INPUT_IMAGE_CLASS: &str = "CPackInputImage";

/// Input class types whose value is a filesystem path.
pub const PATH_INPUT_CLASSES: &[&str] = &[INPUT_FILE_CLASS, INPUT_IMAGE_CLASS];

/// Output node writing an arbitrary file.
pub const OUTPUT_FILE_CLASS: &str = "CPackOutputFile";

/// Output node writing images.
pub const OUTPUT_IMAGE_CLASS: &str = "CPackOutputImage";

/// Output class types the populator knows how to redirect.
pub const OUTPUT_CLASSES: &[&str] = &[OUTPUT_FILE_CLASS, OUTPUT_IMAGE_CLASS];

/// Input slot of output nodes receiving the run-specific file prefix.
pub const FILENAME_PREFIX_INPUT: &str = "filename_prefix";

/// Top-level key only present in the UI-format export.
pub const UI_EXPORT_SENTINEL_KEY: &str = "last_node_id";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// Editor metadata attached to a node under `_meta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Constraint hints: `min`, `max`, `step`, `round`, `precision` or `values`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

/// A single node of a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowNode {
    /// Node ID (string key from the JSON object).
    pub id: String,
    pub class_type: String,
    /// Input slots in document order.
    pub inputs: Map<String, Value>,
    #[serde(rename = "_meta")]
    pub meta: NodeMeta,
}

impl WorkflowNode {
    /// Build a node from its document key and JSON definition.
    pub fn from_json(id: &str, value: &Value) -> Result<Self, CoreError> {
        let obj = value.as_object().ok_or_else(|| {
            CoreError::Validation(format!("Node '{id}' must be a JSON object"))
        })?;

        let class_type = obj
            .get("class_type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Node '{id}' is missing required 'class_type' field"
                ))
            })?
            .to_string();

        let inputs = obj
            .get("inputs")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| {
                CoreError::Validation(format!("Node '{id}' is missing its 'inputs' object"))
            })?;

        let meta = match obj.get("_meta") {
            Some(meta) => serde_json::from_value(meta.clone()).map_err(|e| {
                CoreError::Validation(format!("Node '{id}' has malformed '_meta': {e}"))
            })?,
            None => NodeMeta::default(),
        };

        Ok(Self {
            id: id.to_string(),
            class_type,
            inputs,
            meta,
        })
    }

    /// Display title, falling back to the class type for untitled nodes.
    pub fn title(&self) -> &str {
        self.meta.title.as_deref().unwrap_or(&self.class_type)
    }

    pub fn is_input(&self) -> bool {
        self.class_type.starts_with(INPUT_CLASS_PREFIX)
    }

    pub fn is_output(&self) -> bool {
        self.class_type.starts_with(OUTPUT_CLASS_PREFIX)
    }

    /// Value of the node's first input slot.
    pub fn value(&self) -> Option<&Value> {
        self.inputs.values().next()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Render a path with `/` separators on every platform.
pub fn portable_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Every string literal fed to a node input.
///
/// Loader nodes name their files this way, so the set tells which model
/// and input files a workflow refers to.
pub fn string_inputs(workflow: &Value) -> Result<BTreeSet<String>, CoreError> {
    let mut strings = BTreeSet::new();
    for (id, value) in node_map(workflow)? {
        let node = WorkflowNode::from_json(id, value)?;
        strings.extend(
            node.inputs
                .values()
                .filter_map(Value::as_str)
                .map(str::to_string),
        );
    }
    Ok(strings)
}

/// The top-level node map of a workflow document.
///
/// Rejects UI-format exports with [`CoreError::Format`].
pub(crate) fn node_map(workflow: &Value) -> Result<&Map<String, Value>, CoreError> {
    let obj = workflow.as_object().ok_or_else(|| {
        CoreError::Validation("Workflow JSON must be an object".to_string())
    })?;

    if obj.contains_key(UI_EXPORT_SENTINEL_KEY) {
        return Err(CoreError::Format(
            crate::error::API_WORKFLOW_MESSAGE.to_string(),
        ));
    }

    Ok(obj)
}
