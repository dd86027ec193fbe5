//! Filling a workflow template for a single run.

use std::path::Path;

use serde_json::{Map, Value};

use super::{
    parse_workflow, portable_path, FILENAME_PREFIX_INPUT, OUTPUT_CLASSES, PATH_INPUT_CLASSES,
};
use crate::error::CoreError;

/// File name prefix an output node writes under for a given run.
pub fn output_prefix(output_dir: &Path, session_id: &str, node_id: &str) -> String {
    portable_path(&output_dir.join(format!("{session_id}{node_id}_")))
}

/// Inject input values and redirect outputs, mutating `workflow` in place.
///
/// Each key of `values` must name an input of the template; its value
/// replaces the first input slot of that node. Every recognized output node
/// gets `filename_prefix = "{output_dir}/{session_id}{node_id}_"` so the
/// files of one run can be told apart from those of another.
pub fn populate_workflow(
    workflow: &mut Value,
    output_dir: &Path,
    session_id: &str,
    values: &Map<String, Value>,
) -> Result<(), CoreError> {
    let parsed = parse_workflow(workflow)?;

    // Validate every key before touching the document.
    let mut assignments = Vec::with_capacity(values.len());
    for (name, value) in values {
        let node = parsed
            .inputs
            .get(name)
            .ok_or_else(|| CoreError::UnknownInput(name.clone()))?;
        if !node.is_input() {
            return Err(CoreError::InvalidNode {
                name: name.clone(),
                class_type: node.class_type.clone(),
            });
        }
        let slot = node.inputs.keys().next().cloned().ok_or_else(|| {
            CoreError::Validation(format!("Input node '{}' has no input slot", node.id))
        })?;

        let value = match value {
            Value::String(s) if PATH_INPUT_CLASSES.contains(&node.class_type.as_str()) => {
                Value::String(portable_path(Path::new(s)))
            }
            other => other.clone(),
        };
        assignments.push((node.id.clone(), slot, value));
    }

    let prefixes: Vec<(String, String)> = parsed
        .outputs
        .values()
        .filter(|node| OUTPUT_CLASSES.contains(&node.class_type.as_str()))
        .map(|node| {
            (
                node.id.clone(),
                output_prefix(output_dir, session_id, &node.id),
            )
        })
        .collect();

    for (node_id, slot, value) in assignments {
        if let Some(inputs) = node_inputs_mut(workflow, &node_id) {
            inputs.insert(slot, value);
        }
    }
    for (node_id, prefix) in prefixes {
        if let Some(inputs) = node_inputs_mut(workflow, &node_id) {
            inputs.insert(FILENAME_PREFIX_INPUT.to_string(), Value::String(prefix));
        }
    }

    tracing::debug!(
        session_id,
        inputs = values.len(),
        output_dir = %output_dir.display(),
        "Populated workflow template",
    );

    Ok(())
}

fn node_inputs_mut<'a>(workflow: &'a mut Value, node_id: &str) -> Option<&'a mut Map<String, Value>> {
    workflow
        .get_mut(node_id)?
        .get_mut("inputs")?
        .as_object_mut()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn template() -> Value {
        json!({
            "1": {"class_type": "CPackInputValue", "inputs": {"value": "a dog"}, "_meta": {"title": "prompt"}},
            "2": {"class_type": "CPackInputImage", "inputs": {"image": "example.png"}, "_meta": {"title": "image"}},
            "3": {"class_type": "KSampler", "inputs": {"positive": ["1", 0]}},
            "7": {"class_type": "CPackOutputImage", "inputs": {"images": ["3", 0], "filename_prefix": "ComfyUI"}, "_meta": {"title": "result"}}
        })
    }

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    // -- populate_workflow ----------------------------------------------------

    #[test]
    fn overwrites_first_input_slot() {
        let mut wf = template();
        populate_workflow(&mut wf, Path::new("/out"), "", &values(json!({"prompt": "a cat"})))
            .unwrap();
        assert_eq!(wf["1"]["inputs"]["value"], json!("a cat"));
        assert_eq!(wf["2"]["inputs"]["image"], json!("example.png"));
    }

    #[test]
    fn redirects_outputs_with_session_prefix() {
        let mut wf = template();
        populate_workflow(&mut wf, Path::new("/tmp/out"), "run1_", &Map::new()).unwrap();
        assert_eq!(wf["7"]["inputs"]["filename_prefix"], json!("/tmp/out/run1_7_"));
        assert_eq!(wf["7"]["inputs"]["images"], json!(["3", 0]));
    }

    #[test]
    fn unknown_input_is_rejected_without_changes() {
        let mut wf = template();
        let original = wf.clone();
        let result = populate_workflow(
            &mut wf,
            Path::new("/out"),
            "s",
            &values(json!({"prompt": "x", "missing": 1})),
        );
        assert_matches!(result, Err(CoreError::UnknownInput(ref n)) if n == "missing");
        assert_eq!(wf, original);
    }

    #[test]
    fn populate_then_reparse_keeps_names() {
        let mut wf = template();
        let before = parse_workflow(&wf).unwrap();
        populate_workflow(
            &mut wf,
            Path::new("/out"),
            "abc",
            &values(json!({"prompt": "p", "image": "in/x.png"})),
        )
        .unwrap();
        let after = parse_workflow(&wf).unwrap();
        assert_eq!(
            before.inputs.keys().collect::<Vec<_>>(),
            after.inputs.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            before.outputs.keys().collect::<Vec<_>>(),
            after.outputs.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn unrecognized_output_class_keeps_its_prefix() {
        let mut wf = json!({
            "4": {"class_type": "CPackOutputAudio", "inputs": {"filename_prefix": "keep"}}
        });
        populate_workflow(&mut wf, Path::new("/out"), "s", &Map::new()).unwrap();
        assert_eq!(wf["4"]["inputs"]["filename_prefix"], json!("keep"));
    }

    // -- output_prefix --------------------------------------------------------

    #[test]
    fn prefix_joins_session_and_node_id() {
        assert_eq!(output_prefix(Path::new("out"), "run1_", "7"), "out/run1_7_");
        assert_eq!(output_prefix(Path::new("out"), "", "7"), "out/7_");
    }
}
