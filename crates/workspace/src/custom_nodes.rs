//! Installing the custom node plugins recorded in a snapshot.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use cpack_core::snapshot::CustomNode;

use crate::error::WorkspaceError;
use crate::fetcher::{FetchOutcome, RepositoryFetcher, DONE_MARKER};
use crate::installer::{venv_python, VENV_DIR};
use crate::subprocess::{run_command, Verbosity};

/// Plugin directory inside a workspace.
pub const CUSTOM_NODES_DIR: &str = "custom_nodes";

/// Optional setup script a plugin ships at its root.
const INSTALL_SCRIPT: &str = "install.py";

/// Interpreter used for `install.py`.
///
/// The workspace venv when present, otherwise `python` from `PATH`.
pub fn install_python(workspace: &Path) -> PathBuf {
    if workspace.join(VENV_DIR).exists() {
        let python = venv_python(workspace);
        std::path::absolute(&python).unwrap_or(python)
    } else {
        PathBuf::from("python")
    }
}

/// Check out every plugin of `nodes` into `workspace/custom_nodes`.
///
/// Freshly cloned plugins with an `install.py` have it run. If the script
/// fails the plugin's checkout marker is removed so the next restore
/// retries it.
pub async fn install_custom_nodes<F: RepositoryFetcher>(
    fetcher: &F,
    nodes: &[CustomNode],
    workspace: &Path,
    verbosity: Verbosity,
) -> Result<(), WorkspaceError> {
    let nodes_dir = workspace.join(CUSTOM_NODES_DIR);
    tracing::info!(count = nodes.len(), "Installing custom nodes");

    for node in nodes {
        let dest = nodes_dir.join(node.directory_name()?);
        let outcome = fetcher
            .clone_and_checkout(&node.url, &node.commit_hash, &dest)
            .await?;
        if outcome == FetchOutcome::AlreadyPresent {
            continue;
        }

        if dest.join(INSTALL_SCRIPT).is_file() {
            run_install_script(workspace, &dest, verbosity).await?;
        }
        tracing::info!(url = %node.url, dir = %dest.display(), disabled = node.disabled, "Installed custom node");
    }

    Ok(())
}

async fn run_install_script(
    workspace: &Path,
    node_dir: &Path,
    verbosity: Verbosity,
) -> Result<(), WorkspaceError> {
    let mut cmd = Command::new(install_python(workspace));
    cmd.arg(INSTALL_SCRIPT).current_dir(node_dir);

    if let Err(e) = run_command(&mut cmd, verbosity).await {
        let marker = node_dir.join(DONE_MARKER);
        if let Err(rm) = tokio::fs::remove_file(&marker).await {
            tracing::warn!(marker = %marker.display(), error = %rm, "Failed to remove checkout marker");
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::fetcher::write_marker;

    /// Creates the destination and records each fetch.
    #[derive(Default)]
    struct RecordingFetcher {
        fetched: Mutex<Vec<PathBuf>>,
    }

    impl RepositoryFetcher for RecordingFetcher {
        async fn clone_and_checkout(
            &self,
            _url: &str,
            commit: &str,
            dest: &Path,
        ) -> Result<FetchOutcome, WorkspaceError> {
            if crate::fetcher::is_checked_out(dest, commit) {
                return Ok(FetchOutcome::AlreadyPresent);
            }
            std::fs::create_dir_all(dest).unwrap();
            write_marker(dest, commit)?;
            self.fetched.lock().unwrap().push(dest.to_path_buf());
            Ok(FetchOutcome::Cloned)
        }
    }

    fn node(url: &str, disabled: bool) -> CustomNode {
        CustomNode {
            url: url.to_string(),
            commit_hash: "c0ffee".to_string(),
            disabled,
        }
    }

    // -- install_custom_nodes -------------------------------------------------

    #[tokio::test]
    async fn nodes_land_in_named_directories() {
        let ws = tempfile::tempdir().unwrap();
        let fetcher = RecordingFetcher::default();
        let nodes = [
            node("https://github.com/org/ComfyUI-Manager.git", false),
            node("https://github.com/org/old-nodes", true),
        ];

        install_custom_nodes(&fetcher, &nodes, ws.path(), Verbosity::QUIET)
            .await
            .unwrap();

        let fetched = fetcher.fetched.lock().unwrap().clone();
        assert_eq!(
            fetched,
            vec![
                ws.path().join("custom_nodes/ComfyUI-Manager"),
                ws.path().join("custom_nodes/old-nodes.disabled"),
            ]
        );
    }

    #[tokio::test]
    async fn second_install_fetches_nothing() {
        let ws = tempfile::tempdir().unwrap();
        let fetcher = RecordingFetcher::default();
        let nodes = [node("https://github.com/org/nodes.git", false)];

        install_custom_nodes(&fetcher, &nodes, ws.path(), Verbosity::QUIET)
            .await
            .unwrap();
        install_custom_nodes(&fetcher, &nodes, ws.path(), Verbosity::QUIET)
            .await
            .unwrap();

        assert_eq!(fetcher.fetched.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_install_script_clears_marker() {
        use std::os::unix::fs::PermissionsExt;

        /// Clones a plugin that ships an `install.py`.
        struct PluginWithScript;

        impl RepositoryFetcher for PluginWithScript {
            async fn clone_and_checkout(
                &self,
                _url: &str,
                commit: &str,
                dest: &Path,
            ) -> Result<FetchOutcome, WorkspaceError> {
                std::fs::create_dir_all(dest).unwrap();
                std::fs::write(dest.join(INSTALL_SCRIPT), "raise SystemExit(1)\n").unwrap();
                write_marker(dest, commit)?;
                Ok(FetchOutcome::Cloned)
            }
        }

        let ws = tempfile::tempdir().unwrap();
        let python = venv_python(ws.path());
        std::fs::create_dir_all(python.parent().unwrap()).unwrap();
        std::fs::write(&python, "#!/bin/sh\nexit 1\n").unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let nodes = [node("https://github.com/org/broken.git", false)];
        let result = install_custom_nodes(&PluginWithScript, &nodes, ws.path(), Verbosity::QUIET).await;

        assert!(matches!(result, Err(WorkspaceError::CommandFailed { exit_code: 1, .. })));
        assert!(!ws.path().join("custom_nodes/broken").join(DONE_MARKER).exists());
    }

    #[tokio::test]
    async fn unnamed_node_never_reaches_fetcher() {
        let ws = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(ws.path().join("custom_nodes/keep")).unwrap();
        let fetcher = RecordingFetcher::default();
        let nodes = [node("https://github.com/org/..", false)];

        let result = install_custom_nodes(&fetcher, &nodes, ws.path(), Verbosity::QUIET).await;

        assert!(matches!(result, Err(WorkspaceError::Core(_))));
        assert!(fetcher.fetched.lock().unwrap().is_empty());
        assert!(ws.path().join("custom_nodes/keep").is_dir());
    }

    // -- install_python -------------------------------------------------------

    #[test]
    fn install_python_prefers_workspace_venv() {
        let ws = tempfile::tempdir().unwrap();
        assert_eq!(install_python(ws.path()), PathBuf::from("python"));

        std::fs::create_dir_all(ws.path().join(VENV_DIR)).unwrap();
        assert_eq!(install_python(ws.path()), venv_python(ws.path()));
    }
}
