use std::path::{Path, PathBuf};

use anyhow::Context;

use cpack_core::snapshot::Snapshot;
use cpack_models::ResolveOptions;
use cpack_workspace::restore::resolve_blocking;

use super::{print_json, terminal_resolver};
use crate::config::{GlobalArgs, ModelArgs};

pub async fn execute(
    global: &GlobalArgs,
    snapshot: &Path,
    workspace: Option<PathBuf>,
    models: &ModelArgs,
) -> anyhow::Result<()> {
    let home = global.home()?;
    let workspace = workspace.unwrap_or_else(|| home.workspace_dir());
    let snapshot = Snapshot::load(snapshot)
        .with_context(|| format!("failed to read {}", snapshot.display()))?;

    let options = ResolveOptions {
        interactive: !models.no_prompt,
        allow_network: !models.offline,
    };
    let (_, report) = resolve_blocking(terminal_resolver(&home), snapshot.models, &workspace, options)
        .await
        .context("model resolution failed")?;

    let pending = report.pending().count();
    if pending > 0 {
        tracing::warn!(pending, "Some models are still missing");
    }
    print_json(&report)
}
