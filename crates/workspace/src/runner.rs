//! Running workflow templates in a restored workspace through the `comfy`
//! CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::process::Command;

use cpack_core::workflow::{populate_workflow, retrieve_outputs, WorkflowOutputs};

use crate::error::WorkspaceError;
use crate::subprocess::{run_command, Verbosity};

/// Endpoint probed to confirm the background server is up.
pub const COMFYUI_PROBE_URL: &str =
    "http://127.0.0.1:8188/api/customnode/getmappings?mode=nickname";

/// Default `comfy run` timeout in seconds.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 300;

/// File the populated workflow is written to before each run.
const WORKFLOW_FILE: &str = "workflow.json";

/// Backoff parameters for probing the server after launch.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_attempts: 8,
        }
    }
}

/// Calculate the next backoff delay, clamped to [`ProbeConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ProbeConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// A ComfyUI server launched in the background for a workspace.
#[derive(Debug)]
pub struct WorkflowRunner {
    workspace: PathBuf,
    input_dir: Option<PathBuf>,
    temp_dir: PathBuf,
    output_dir: PathBuf,
    verbosity: Verbosity,
    probe: ProbeConfig,
    running: bool,
}

impl WorkflowRunner {
    pub fn new(workspace: impl Into<PathBuf>, input_dir: Option<PathBuf>) -> Self {
        let workspace = workspace.into();
        let run_dir = workspace.join("cli_run");
        Self {
            temp_dir: run_dir.join("temp"),
            output_dir: run_dir.join("output"),
            workspace,
            input_dir,
            verbosity: Verbosity::QUIET,
            probe: ProbeConfig::default(),
            running: false,
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// `comfy ... launch --background` command for this workspace.
    pub fn launch_command(&self) -> Command {
        let mut cmd = Command::new("comfy");
        cmd.arg("--workspace")
            .arg(&self.workspace)
            .args(["launch", "--background", "--"])
            .arg("--output-directory")
            .arg(&self.output_dir)
            .arg("--temp-directory")
            .arg(&self.temp_dir);
        if let Some(input_dir) = &self.input_dir {
            cmd.arg("--input-directory").arg(input_dir);
        }
        cmd
    }

    /// `comfy run` command for a written workflow file.
    pub fn run_command_for(&self, workflow_file: &Path, timeout_secs: u64) -> Command {
        let mut cmd = Command::new("comfy");
        cmd.arg("run")
            .arg("--workflow")
            .arg(workflow_file)
            .arg("--timeout")
            .arg(timeout_secs.to_string())
            .arg("--wait");
        if self.verbosity.shows_stdout() {
            cmd.arg("--verbose");
        }
        cmd.env("NO_COLOR", "1");
        cmd
    }

    /// Launch ComfyUI in the background and wait until it answers.
    pub async fn start(&mut self) -> Result<(), WorkspaceError> {
        if self.running {
            return Err(WorkspaceError::AlreadyStarted);
        }

        for dir in [&self.temp_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(WorkspaceError::io(dir))?;
        }

        // Tracking prompts block a non-interactive launch.
        let mut disable_tracking = Command::new("comfy");
        disable_tracking.args(["--skip-prompt", "tracking", "disable"]);
        run_command(&mut disable_tracking, self.verbosity).await?;
        tracing::info!("Disabled comfy CLI tracking");

        tracing::info!(workspace = %self.workspace.display(), "Starting ComfyUI in the background");
        run_command(&mut self.launch_command(), self.verbosity).await?;
        self.running = true;

        probe_server(&self.probe).await?;
        tracing::info!("ComfyUI is up");
        Ok(())
    }

    /// Stop the background server and remove its temp and output
    /// directories.
    pub async fn stop(&mut self) -> Result<(), WorkspaceError> {
        if !self.running {
            return Err(WorkspaceError::NotStarted);
        }

        tracing::info!("Stopping ComfyUI");
        let mut stop = Command::new("comfy");
        stop.arg("stop");
        run_command(&mut stop, self.verbosity).await?;

        for dir in [&self.temp_dir, &self.output_dir] {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                tracing::debug!(dir = %dir.display(), error = %e, "Nothing to clean up");
            }
        }

        self.running = false;
        Ok(())
    }

    /// Run `workflow` with `values` and collect its outputs.
    ///
    /// The template is copied, populated under a fresh 16-hex-digit run id
    /// and written to `<workspace>/workflow.json`. Outputs go to
    /// `output_dir`, or the server's output directory when `None`.
    pub async fn run_workflow(
        &self,
        workflow: &Value,
        values: &Map<String, Value>,
        output_dir: Option<&Path>,
        timeout_secs: u64,
    ) -> Result<WorkflowOutputs, WorkspaceError> {
        if !self.running {
            return Err(WorkspaceError::NotStarted);
        }

        let output_dir = output_dir.unwrap_or(&self.output_dir);
        let output_dir = std::path::absolute(output_dir).map_err(WorkspaceError::io(output_dir))?;
        let run_id = new_run_id();

        let mut populated = workflow.clone();
        populate_workflow(&mut populated, &output_dir, &run_id, values)?;

        let workflow_file = self.workspace.join(WORKFLOW_FILE);
        let body = serde_json::to_vec(&populated).map_err(|e| WorkspaceError::Io {
            path: workflow_file.clone(),
            source: std::io::Error::other(e),
        })?;
        tokio::fs::write(&workflow_file, body)
            .await
            .map_err(WorkspaceError::io(&workflow_file))?;

        tracing::info!(run_id = %run_id, timeout_secs, "Running workflow");
        run_command(
            &mut self.run_command_for(&workflow_file, timeout_secs),
            self.verbosity,
        )
        .await?;

        Ok(retrieve_outputs(&populated, &output_dir, &run_id)?)
    }
}

/// Random run id: 8 random bytes as 16 lowercase hex digits.
pub fn new_run_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

async fn probe_server(config: &ProbeConfig) -> Result<(), WorkspaceError> {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let error = match reqwest::get(COMFYUI_PROBE_URL).await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => format!("HTTP {}", resp.status()),
            Err(e) => e.to_string(),
        };

        if attempt >= config.max_attempts {
            return Err(WorkspaceError::ServerUnreachable(error));
        }
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Waiting for ComfyUI");
        tokio::time::sleep(delay).await;
        delay = next_delay(delay, config);
    }
}
