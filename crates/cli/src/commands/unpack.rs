use std::path::{Path, PathBuf};

use anyhow::Context;

use cpack_workspace::{restore_workspace, GitFetcher, RestoreOptions, UvInstaller};

use super::{print_json, terminal_resolver};
use crate::config::{GlobalArgs, ModelArgs};

pub async fn execute(
    global: &GlobalArgs,
    pack: &Path,
    workspace: Option<PathBuf>,
    models: &ModelArgs,
) -> anyhow::Result<()> {
    let home = global.home()?;
    let workspace = workspace.unwrap_or_else(|| home.workspace_dir());
    let verbosity = global.verbosity();

    let options = RestoreOptions {
        verbosity,
        interactive: !models.no_prompt,
        allow_network: !models.offline,
    };

    let (report, _) = restore_workspace(
        pack,
        &workspace,
        &GitFetcher::new(verbosity),
        &UvInstaller::new(verbosity),
        terminal_resolver(&home),
        options,
    )
    .await
    .with_context(|| format!("failed to restore {} into {}", pack.display(), workspace.display()))?;

    print_json(&report)
}
