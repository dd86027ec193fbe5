//! Collection of the files a run wrote, by output name.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use super::{parse_workflow, WorkflowNode, OUTPUT_CLASSES};
use crate::error::CoreError;

/// Files matched for one named output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutputFiles {
    Single(PathBuf),
    Many(Vec<PathBuf>),
}

impl OutputFiles {
    fn from_matches(mut paths: Vec<PathBuf>) -> Self {
        if paths.len() == 1 {
            Self::Single(paths.remove(0))
        } else {
            Self::Many(paths)
        }
    }
}

/// Result of [`retrieve_outputs`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WorkflowOutputs {
    /// The template has one output and it produced exactly one file.
    Single(PathBuf),
    /// The template has one output and it produced zero or several files.
    List(Vec<PathBuf>),
    /// Output name to files, for templates with zero or several outputs.
    Named(IndexMap<String, OutputFiles>),
}

/// Collect the files written by a populated run.
///
/// Files are matched by the `{session_id}{node_id}_` prefix the populator
/// assigned and returned sorted by path.
pub fn retrieve_outputs(
    workflow: &Value,
    output_dir: &Path,
    session_id: &str,
) -> Result<WorkflowOutputs, CoreError> {
    let parsed = parse_workflow(workflow)?;

    if parsed.outputs.len() == 1 {
        let Some((name, node)) = parsed.outputs.first() else {
            return Ok(WorkflowOutputs::List(Vec::new()));
        };
        if !OUTPUT_CLASSES.contains(&node.class_type.as_str()) {
            return Err(CoreError::InvalidOutputType {
                name: name.clone(),
                class_type: node.class_type.clone(),
                expected: OUTPUT_CLASSES.join(", "),
            });
        }

        let mut paths = matching_files(output_dir, session_id, node)?;
        return Ok(if paths.len() == 1 {
            WorkflowOutputs::Single(paths.remove(0))
        } else {
            WorkflowOutputs::List(paths)
        });
    }

    let mut named = IndexMap::with_capacity(parsed.outputs.len());
    for (name, node) in &parsed.outputs {
        let paths = matching_files(output_dir, session_id, node)?;
        named.insert(name.clone(), OutputFiles::from_matches(paths));
    }

    Ok(WorkflowOutputs::Named(named))
}

fn matching_files(
    output_dir: &Path,
    session_id: &str,
    node: &WorkflowNode,
) -> Result<Vec<PathBuf>, CoreError> {
    let prefix = format!("{session_id}{}_", node.id);
    let io_err = |source| CoreError::Io {
        path: output_dir.to_path_buf(),
        source,
    };

    let entries = match std::fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_err)?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            paths.push(entry.path());
        }
    }
    paths.sort();

    tracing::debug!(node_id = %node.id, matches = paths.len(), "Matched output files");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    fn single_output() -> Value {
        json!({
            "7": {"class_type": "CPackOutputImage", "inputs": {"filename_prefix": ""}, "_meta": {"title": "result"}}
        })
    }

    // -- retrieve_outputs -----------------------------------------------------

    #[test]
    fn single_match_is_single_path() {
        let dir = tempfile::tempdir().unwrap();
        let expected = touch(dir.path(), "run1_7_00001_.png");
        touch(dir.path(), "run2_7_00001_.png");

        let outputs = retrieve_outputs(&single_output(), dir.path(), "run1_").unwrap();
        assert_eq!(outputs, WorkflowOutputs::Single(expected));
    }

    #[test]
    fn several_matches_are_sorted_list() {
        let dir = tempfile::tempdir().unwrap();
        let b = touch(dir.path(), "run1_7_00002_.png");
        let a = touch(dir.path(), "run1_7_00001_.png");

        let outputs = retrieve_outputs(&single_output(), dir.path(), "run1_").unwrap();
        assert_eq!(outputs, WorkflowOutputs::List(vec![a, b]));
    }

    #[test]
    fn no_match_is_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = retrieve_outputs(&single_output(), dir.path(), "run1_").unwrap();
        assert_eq!(outputs, WorkflowOutputs::List(Vec::new()));
    }

    #[test]
    fn single_unknown_output_class_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let wf = json!({"3": {"class_type": "CPackOutputAudio", "inputs": {}, "_meta": {"title": "audio"}}});
        let result = retrieve_outputs(&wf, dir.path(), "");
        assert_matches!(result, Err(CoreError::InvalidOutputType { ref name, .. }) if name == "audio");
    }

    #[test]
    fn multiple_outputs_are_named_with_session_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let wf = json!({
            "7": {"class_type": "CPackOutputImage", "inputs": {}, "_meta": {"title": "image"}},
            "8": {"class_type": "CPackOutputFile", "inputs": {}, "_meta": {"title": "video"}}
        });
        let img = touch(dir.path(), "abc7_00001_.png");
        let v1 = touch(dir.path(), "abc8_a.mp4");
        let v2 = touch(dir.path(), "abc8_b.mp4");
        touch(dir.path(), "7_stale.png");

        let outputs = retrieve_outputs(&wf, dir.path(), "abc").unwrap();
        let WorkflowOutputs::Named(named) = outputs else {
            panic!("expected named outputs");
        };
        assert_eq!(named["image"], OutputFiles::Single(img));
        assert_eq!(named["video"], OutputFiles::Many(vec![v1, v2]));
    }

    #[test]
    fn missing_output_dir_yields_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let outputs =
            retrieve_outputs(&single_output(), &dir.path().join("absent"), "s").unwrap();
        assert_eq!(outputs, WorkflowOutputs::List(Vec::new()));
    }
}
