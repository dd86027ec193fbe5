//! Isolated Python environments for restored workspaces.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::WorkspaceError;
use crate::subprocess::{run_command, Verbosity};

/// Virtual environment directory inside a workspace.
pub const VENV_DIR: &str = ".venv";

/// Marker written inside the venv once dependencies are installed.
pub const VENV_DONE_MARKER: &str = "DONE";

/// Interpreter of the workspace virtual environment.
pub fn venv_python(workspace: &Path) -> PathBuf {
    let venv = workspace.join(VENV_DIR);
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// Builds the Python environment a workspace runs in.
pub trait DependencyInstaller: Send + Sync {
    /// Install `python_version` and the pinned `requirements` into
    /// `workspace/.venv`, returning the environment's interpreter.
    ///
    /// Idempotent via `.venv/DONE`.
    fn install(
        &self,
        python_version: &str,
        requirements: &Path,
        workspace: &Path,
    ) -> impl Future<Output = Result<PathBuf, WorkspaceError>> + Send;
}

/// [`DependencyInstaller`] driving the `uv` CLI.
#[derive(Debug, Clone, Default)]
pub struct UvInstaller {
    pub verbosity: Verbosity,
}

impl UvInstaller {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    async fn uv(&self, dir: Option<&Path>, args: &[&str]) -> Result<(), WorkspaceError> {
        let mut cmd = Command::new("uv");
        cmd.args(args);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        run_command(&mut cmd, self.verbosity).await
    }
}

impl DependencyInstaller for UvInstaller {
    async fn install(
        &self,
        python_version: &str,
        requirements: &Path,
        workspace: &Path,
    ) -> Result<PathBuf, WorkspaceError> {
        tracing::info!(python_version, workspace = %workspace.display(), "Installing Python dependencies");

        self.uv(Some(workspace), &["python", "install", python_version])
            .await?;

        let venv = workspace.join(VENV_DIR);
        let python = venv_python(workspace);
        if venv.join(VENV_DONE_MARKER).exists() {
            tracing::info!(venv = %venv.display(), "Python environment already installed");
            return Ok(python);
        }

        let venv_str = venv.to_string_lossy();
        let python_str = python.to_string_lossy();
        let requirements_str = requirements.to_string_lossy();

        self.uv(None, &["venv", "--python", python_version, venv_str.as_ref()])
            .await?;
        self.uv(None, &["pip", "install", "-p", python_str.as_ref(), "pip"])
            .await?;
        self.uv(
            None,
            &[
                "pip",
                "install",
                "-p",
                python_str.as_ref(),
                "-r",
                requirements_str.as_ref(),
                "--no-deps",
            ],
        )
        .await?;

        let marker = venv.join(VENV_DONE_MARKER);
        tokio::fs::write(&marker, VENV_DONE_MARKER)
            .await
            .map_err(WorkspaceError::io(&marker))?;

        Ok(python)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venv_python_lives_under_dot_venv() {
        let python = venv_python(Path::new("/ws"));
        assert!(python.starts_with("/ws/.venv"));
        assert!(python.to_string_lossy().contains("python"));
    }
}
