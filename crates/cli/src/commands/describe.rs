use std::path::Path;

use anyhow::Context;
use serde_json::{json, Value};

use cpack_core::workflow::{generate_schema, parse_workflow};

use super::print_json;

/// Read a JSON document, keeping its key order.
pub fn load_json(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

pub fn execute(workflow: &Path, json_schema: bool) -> anyhow::Result<()> {
    let document = load_json(workflow)?;

    let schema = generate_schema(&document)?;
    if json_schema {
        return print_json(&schema.to_json_schema());
    }

    let parsed = parse_workflow(&document)?;
    let outputs: Vec<Value> = parsed
        .outputs
        .iter()
        .map(|(name, node)| json!({"name": name, "node_id": node.id, "class_type": node.class_type}))
        .collect();

    print_json(&json!({
        "inputs": schema.fields,
        "outputs": outputs,
    }))
}
