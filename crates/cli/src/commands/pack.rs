use std::path::{Path, PathBuf};

use anyhow::Context;

use cpack_models::DigestCache;
use cpack_workspace::{pack_workspace, CliInspector};

use super::describe::load_json;
use super::print_json;
use crate::config::GlobalArgs;

pub async fn execute(
    global: &GlobalArgs,
    workflow_api: &Path,
    workflow: Option<&Path>,
    workspace: Option<PathBuf>,
    output: &Path,
) -> anyhow::Result<()> {
    let home = global.home()?;
    let workspace = workspace.unwrap_or_else(|| home.workspace_dir());

    let api = load_json(workflow_api)?;
    let ui = workflow.map(load_json).transpose()?;

    let (report, _) = pack_workspace(
        &workspace,
        &api,
        ui.as_ref(),
        output,
        &CliInspector::new(global.verbosity()),
        DigestCache::load(home.sha_cache_file()),
    )
    .await
    .with_context(|| format!("failed to pack {} into {}", workspace.display(), output.display()))?;

    print_json(&report)
}
