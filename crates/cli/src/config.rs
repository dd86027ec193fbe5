//! Command-line configuration.
//!
//! ```text
//! Cli
//! ├── global: GlobalArgs   # --home / CPACK_HOME, -v
//! └── command: Command     # pack | unpack | models | describe | run
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use cpack_core::home::{CpackHome, CPACK_HOME_ENV};
use cpack_workspace::Verbosity;

#[derive(Debug, Parser)]
#[command(name = "cpack")]
#[command(about = "Pack and restore reproducible ComfyUI workspaces and run their workflows")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Directory holding the model store and default workspace.
    #[arg(long, global = true, env = CPACK_HOME_ENV)]
    pub home: Option<PathBuf>,

    /// Show subprocess output: -v for stdout, -vv for stdout and stderr.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl GlobalArgs {
    /// Resolved home directory, created if missing.
    pub fn home(&self) -> anyhow::Result<CpackHome> {
        let home = match &self.home {
            Some(root) => CpackHome::new(root),
            None => CpackHome::from_env().context("failed to locate the comfy-pack home")?,
        };
        home.ensure().context("failed to create the comfy-pack home")?;
        Ok(home)
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity(self.verbose)
    }
}

/// Options shared by commands that resolve models.
#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Never prompt for missing models; leave them pending.
    #[arg(long)]
    pub no_prompt: bool,

    /// Refuse download URLs when prompting for models.
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pack a workspace and the workflow it serves into a pack archive.
    Pack {
        /// Workflow JSON exported with "Save (API Format)".
        workflow_api: PathBuf,

        /// UI-format workflow to bundle alongside it.
        #[arg(long)]
        workflow: Option<PathBuf>,

        /// Workspace to pack (default: <home>/workspace).
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Archive to write.
        #[arg(short, long, default_value = "workspace.cpack.zip")]
        output: PathBuf,
    },

    /// Restore a workspace from a pack archive.
    Unpack {
        /// Pack archive (.cpack.zip).
        pack: PathBuf,

        /// Target workspace (default: <home>/workspace).
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[command(flatten)]
        models: ModelArgs,
    },

    /// Link the models of a snapshot into an existing workspace.
    Models {
        /// snapshot.json describing the models.
        snapshot: PathBuf,

        /// Target workspace (default: <home>/workspace).
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[command(flatten)]
        models: ModelArgs,
    },

    /// Print the input schema and outputs of an API-format workflow.
    Describe {
        /// Workflow JSON exported with "Save (API Format)".
        workflow: PathBuf,

        /// Print only the JSON Schema of the inputs.
        #[arg(long)]
        json_schema: bool,
    },

    /// Run a workflow in a restored workspace and print its outputs.
    Run {
        /// Workflow JSON exported with "Save (API Format)"
        /// (default: the workspace's workflow_api.json from its pack).
        workflow: Option<PathBuf>,

        /// Workspace to run in (default: <home>/workspace).
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Input value as NAME=VALUE; VALUE is parsed as JSON when possible.
        #[arg(short, long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,

        /// JSON file with an object of input values.
        #[arg(long)]
        inputs_file: Option<PathBuf>,

        /// Directory outputs are written to.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// ComfyUI input directory.
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Seconds to wait for the workflow to finish.
        #[arg(long, default_value_t = cpack_workspace::runner::DEFAULT_RUN_TIMEOUT_SECS)]
        timeout: u64,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_collects_repeated_inputs() {
        let cli = Cli::parse_from([
            "cpack", "-vv", "run", "wf.json", "-i", "prompt=a cat", "-i", "steps=20",
        ]);
        assert_eq!(cli.global.verbose, 2);
        let Command::Run { inputs, timeout, .. } = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(inputs, vec!["prompt=a cat", "steps=20"]);
        assert_eq!(timeout, 300);
    }

    #[test]
    fn run_workflow_defaults_to_bundled_one() {
        let cli = Cli::parse_from(["cpack", "run", "-i", "steps=20"]);
        let Command::Run { workflow, .. } = cli.command else {
            panic!("expected run command");
        };
        assert!(workflow.is_none());
    }

    #[test]
    fn pack_defaults_output_archive() {
        let cli = Cli::parse_from(["cpack", "pack", "api.json", "--workflow", "ui.json"]);
        let Command::Pack {
            workflow_api,
            workflow,
            output,
            ..
        } = cli.command
        else {
            panic!("expected pack command");
        };
        assert_eq!(workflow_api, PathBuf::from("api.json"));
        assert_eq!(workflow, Some(PathBuf::from("ui.json")));
        assert_eq!(output, PathBuf::from("workspace.cpack.zip"));
    }
}
