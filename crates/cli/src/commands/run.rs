use std::path::PathBuf;

use anyhow::{bail, Context};
use serde_json::{Map, Value};

use cpack_core::workflow::generate_schema;
use cpack_workspace::archive::WORKFLOW_API_FILE;
use cpack_workspace::WorkflowRunner;

use super::describe::load_json;
use super::print_json;
use crate::config::GlobalArgs;

pub struct RunArgs {
    pub workflow: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub inputs: Vec<String>,
    pub inputs_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub timeout: u64,
}

pub async fn execute(global: &GlobalArgs, args: RunArgs) -> anyhow::Result<()> {
    let home = global.home()?;
    let workspace = args.workspace.unwrap_or_else(|| home.workspace_dir());

    let workflow_path = args
        .workflow
        .unwrap_or_else(|| workspace.join(WORKFLOW_API_FILE));
    let workflow = load_json(&workflow_path)?;
    let schema = generate_schema(&workflow)?;

    let mut payload = match &args.inputs_file {
        Some(path) => match load_json(path)? {
            Value::Object(map) => map,
            _ => bail!("{} must contain a JSON object", path.display()),
        },
        None => Map::new(),
    };
    for pair in &args.inputs {
        let (name, value) = parse_input(pair)?;
        payload.insert(name, value);
    }
    let values = schema
        .validate(&Value::Object(payload))
        .context("invalid workflow inputs")?;

    let mut runner =
        WorkflowRunner::new(&workspace, args.input_dir).with_verbosity(global.verbosity());
    runner.start().await.context("failed to start ComfyUI")?;

    // The runner's own output directory is removed on stop.
    let output_dir = args.output_dir.unwrap_or_else(|| PathBuf::from("."));
    let result = runner
        .run_workflow(&workflow, &values, Some(output_dir.as_path()), args.timeout)
        .await;

    if let Err(e) = runner.stop().await {
        tracing::warn!(error = %e, "Failed to stop ComfyUI");
    }
    print_json(&result.context("workflow run failed")?)
}

/// Split `NAME=VALUE`, parsing VALUE as JSON and falling back to a string.
fn parse_input(pair: &str) -> anyhow::Result<(String, Value)> {
    let Some((name, raw)) = pair.split_once('=') else {
        bail!("input '{pair}' must have the form NAME=VALUE");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("input '{pair}' has an empty name");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_input_reads_json_values() {
        assert_eq!(parse_input("steps=20").unwrap(), ("steps".into(), json!(20)));
        assert_eq!(parse_input("cfg=7.5").unwrap(), ("cfg".into(), json!(7.5)));
        assert_eq!(parse_input("flag=true").unwrap(), ("flag".into(), json!(true)));
    }

    #[test]
    fn parse_input_falls_back_to_string() {
        assert_eq!(
            parse_input("prompt=a cat = cute").unwrap(),
            ("prompt".into(), json!("a cat = cute"))
        );
    }

    #[test]
    fn parse_input_requires_name() {
        assert!(parse_input("no-equals").is_err());
        assert!(parse_input("=1").is_err());
    }
}
