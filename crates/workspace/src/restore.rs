//! Restoring a workspace from a pack archive.
//!
//! Steps, in order:
//!
//! 1. unpack the archive and read `snapshot.json`;
//! 2. check out ComfyUI at the recorded commit into the workspace;
//! 3. build the Python environment from `requirements.txt`;
//! 4. copy the bundled `input/` files and API-format workflow;
//! 5. adopt or link models already available (no prompts);
//! 6. install custom nodes;
//! 7. acquire the remaining models interactively.
//!
//! Model resolution is filesystem-bound and may block on the terminal, so
//! it runs on the blocking thread pool.

use std::path::{Path, PathBuf};

use serde::Serialize;

use cpack_core::home::COMFYUI_REPO;
use cpack_core::snapshot::ModelEntry;
use cpack_models::{Downloader, ModelResolver, ResolveOptions, ResolveReport, UserInput};

use crate::archive::{copy_dir_contents, unpack, INPUT_DIR, WORKFLOW_API_FILE};
use crate::custom_nodes::install_custom_nodes;
use crate::error::WorkspaceError;
use crate::fetcher::RepositoryFetcher;
use crate::installer::DependencyInstaller;
use crate::subprocess::Verbosity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    pub verbosity: Verbosity,
    /// Prompt for models that are still missing after custom nodes are
    /// installed.
    pub interactive: bool,
    /// Accept URLs when prompting for models.
    pub allow_network: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub workspace: PathBuf,
    pub comfyui_commit: String,
    pub python: PathBuf,
    pub input_files: u64,
    /// The pack's API-format workflow, copied into the workspace.
    pub workflow_api: Option<PathBuf>,
    /// Non-interactive pass run before custom nodes are installed.
    pub prepared: ResolveReport,
    /// Final pass.
    pub models: ResolveReport,
}

/// Restore `workspace` from the pack at `pack`.
///
/// Returns the report together with the resolver, so its digest cache and
/// collaborators can be reused.
pub async fn restore_workspace<F, I, U, D>(
    pack: &Path,
    workspace: &Path,
    fetcher: &F,
    installer: &I,
    resolver: ModelResolver<U, D>,
    options: RestoreOptions,
) -> Result<(RestoreReport, ModelResolver<U, D>), WorkspaceError>
where
    F: RepositoryFetcher,
    I: DependencyInstaller,
    U: UserInput + Send + 'static,
    D: Downloader + Send + 'static,
{
    let pack_path = pack.to_path_buf();
    let unpacked = tokio::task::spawn_blocking(move || unpack(&pack_path))
        .await
        .map_err(|e| WorkspaceError::Task(e.to_string()))??;
    let snapshot = unpacked.snapshot.clone();

    tracing::info!(workspace = %workspace.display(), commit = %snapshot.comfyui, "Installing ComfyUI");
    fetcher
        .clone_and_checkout(COMFYUI_REPO, &snapshot.comfyui, workspace)
        .await?;

    let python = installer
        .install(&snapshot.python, &unpacked.requirements(), workspace)
        .await?;

    let input_files = copy_dir_contents(&unpacked.input_dir(), &workspace.join(INPUT_DIR))?;
    tracing::info!(count = input_files, "Copied input files");

    let workflow_api = match unpacked.workflow_api() {
        Some(bundled) => {
            let dest = workspace.join(WORKFLOW_API_FILE);
            std::fs::copy(&bundled, &dest).map_err(WorkspaceError::io(&bundled))?;
            tracing::info!(path = %dest.display(), "Copied bundled workflow");
            Some(dest)
        }
        None => None,
    };

    let prepare = ResolveOptions {
        interactive: false,
        allow_network: options.allow_network,
    };
    let (resolver, prepared) =
        resolve_blocking(resolver, snapshot.models.clone(), workspace, prepare).await?;

    install_custom_nodes(fetcher, &snapshot.custom_nodes, workspace, options.verbosity).await?;

    let finish = ResolveOptions {
        interactive: options.interactive,
        allow_network: options.allow_network,
    };
    let (resolver, models) =
        resolve_blocking(resolver, snapshot.models.clone(), workspace, finish).await?;

    tracing::info!(workspace = %workspace.display(), "Workspace restored");
    let report = RestoreReport {
        workspace: workspace.to_path_buf(),
        comfyui_commit: snapshot.comfyui,
        python,
        input_files,
        workflow_api,
        prepared,
        models,
    };
    Ok((report, resolver))
}

/// Run one resolution pass on the blocking pool.
pub async fn resolve_blocking<U, D>(
    mut resolver: ModelResolver<U, D>,
    models: Vec<ModelEntry>,
    workspace: &Path,
    options: ResolveOptions,
) -> Result<(ModelResolver<U, D>, ResolveReport), WorkspaceError>
where
    U: UserInput + Send + 'static,
    D: Downloader + Send + 'static,
{
    let workspace = workspace.to_path_buf();
    let (resolver, report) = tokio::task::spawn_blocking(move || {
        let report = resolver.resolve(&models, &workspace, options);
        (resolver, report)
    })
    .await
    .map_err(|e| WorkspaceError::Task(e.to_string()))?;

    Ok((resolver, report?))
}
