//! Extraction of the named input/output contract from a workflow template.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use super::{node_map, WorkflowNode};
use crate::error::CoreError;
use crate::naming::{is_identifier, normalize_to_identifier};

/// Reverse link map: `(producer id, output slot)` → `(consumer id, consumer input name)`.
type LinkMap = HashMap<(String, u64), (String, String)>;

/// The public contract of a workflow template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedWorkflow {
    /// Input nodes keyed by their derived name, in document order.
    pub inputs: IndexMap<String, WorkflowNode>,
    /// Output nodes keyed by their derived name, in document order.
    pub outputs: IndexMap<String, WorkflowNode>,
}

/// Parse a workflow template into named inputs and outputs.
///
/// Names are derived per node with this precedence:
///
/// 1. the node title, if it is a bare identifier;
/// 2. for inputs, the normalized name of the input slot consuming the
///    node's first output;
/// 3. the normalized title.
///
/// A name already taken gets `_{node_id}` appended. The document itself is
/// not modified.
pub fn parse_workflow(workflow: &Value) -> Result<ParsedWorkflow, CoreError> {
    let nodes = node_map(workflow)?;

    let mut parsed_nodes = Vec::with_capacity(nodes.len());
    for (id, value) in nodes {
        parsed_nodes.push(WorkflowNode::from_json(id, value)?);
    }

    let links = build_link_map(&parsed_nodes);

    let mut parsed = ParsedWorkflow::default();
    for node in parsed_nodes {
        if node.is_input() {
            let name = node_identifier(&node, Some(&links));
            let name = unique_name(&parsed.inputs, name, &node.id);
            parsed.inputs.insert(name, node);
        } else if node.is_output() {
            let name = node_identifier(&node, None);
            let name = unique_name(&parsed.outputs, name, &node.id);
            parsed.outputs.insert(name, node);
        }
    }

    tracing::debug!(
        inputs = parsed.inputs.len(),
        outputs = parsed.outputs.len(),
        "Parsed workflow template",
    );

    Ok(parsed)
}

/// Decode a `[node_id, output_slot]` link reference.
///
/// The producer id may be a string or an integer; the slot must be a
/// non-negative integer.
pub(crate) fn as_link(value: &Value) -> Option<(String, u64)> {
    let arr = value.as_array()?;
    if arr.len() != 2 {
        return None;
    }

    let producer = match &arr[0] {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_u64() => n.to_string(),
        _ => return None,
    };
    let slot = arr[1].as_u64()?;

    Some((producer, slot))
}

fn build_link_map(nodes: &[WorkflowNode]) -> LinkMap {
    let mut links = LinkMap::new();
    for node in nodes {
        for (input_name, value) in &node.inputs {
            if let Some(key) = as_link(value) {
                links.insert(key, (node.id.clone(), input_name.clone()));
            }
        }
    }
    links
}

fn node_identifier(node: &WorkflowNode, links: Option<&LinkMap>) -> String {
    let title = node.title();
    if is_identifier(title) {
        return title.to_string();
    }

    if let Some((_, input_name)) = links.and_then(|l| l.get(&(node.id.clone(), 0))) {
        return normalize_to_identifier(input_name);
    }

    normalize_to_identifier(title)
}

fn unique_name(taken: &IndexMap<String, WorkflowNode>, name: String, node_id: &str) -> String {
    let mut name = name;
    while taken.contains_key(&name) {
        name = format!("{name}_{node_id}");
    }
    name
}
