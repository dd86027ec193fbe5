//! Checking out git repositories at an exact commit.

use std::future::Future;
use std::path::Path;

use tokio::process::Command;

use crate::error::WorkspaceError;
use crate::subprocess::{run_command, Verbosity};

/// Marker file recording the commit a checkout was completed at.
pub const DONE_MARKER: &str = ".DONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// `dest` already held a completed checkout of the commit.
    AlreadyPresent,
    /// The repository was (re)cloned.
    Cloned,
}

/// Produces a checkout of a repository at a given commit.
pub trait RepositoryFetcher: Send + Sync {
    /// Check out `url` at `commit` into `dest`.
    ///
    /// Idempotent: a destination whose [`DONE_MARKER`] names `commit` is
    /// left untouched. Any other existing destination is replaced.
    fn clone_and_checkout(
        &self,
        url: &str,
        commit: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<FetchOutcome, WorkspaceError>> + Send;
}

/// Whether `dest` holds a completed checkout of `commit`.
pub fn is_checked_out(dest: &Path, commit: &str) -> bool {
    std::fs::read_to_string(dest.join(DONE_MARKER))
        .map(|recorded| recorded.trim() == commit.trim())
        .unwrap_or(false)
}

/// Record `commit` as completely checked out in `dest`.
pub fn write_marker(dest: &Path, commit: &str) -> Result<(), WorkspaceError> {
    let marker = dest.join(DONE_MARKER);
    std::fs::write(&marker, commit).map_err(WorkspaceError::io(marker))
}

/// [`RepositoryFetcher`] driving the `git` CLI.
#[derive(Debug, Clone, Default)]
pub struct GitFetcher {
    pub verbosity: Verbosity,
}

impl GitFetcher {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    async fn git(&self, dir: Option<&Path>, args: &[&str]) -> Result<(), WorkspaceError> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        run_command(&mut cmd, self.verbosity).await
    }
}

impl RepositoryFetcher for GitFetcher {
    async fn clone_and_checkout(
        &self,
        url: &str,
        commit: &str,
        dest: &Path,
    ) -> Result<FetchOutcome, WorkspaceError> {
        if dest.exists() {
            if is_checked_out(dest, commit) {
                tracing::info!(url, commit, dest = %dest.display(), "Repository already checked out");
                return Ok(FetchOutcome::AlreadyPresent);
            }
            tracing::warn!(dest = %dest.display(), "Removing stale checkout");
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(WorkspaceError::io(dest))?;
        }

        tracing::info!(url, commit, dest = %dest.display(), "Cloning repository");
        let dest_str = dest.to_string_lossy();
        self.git(
            None,
            &[
                "clone",
                "--recurse-submodules",
                "--filter=blob:none",
                url,
                dest_str.as_ref(),
            ],
        )
        .await?;
        self.git(Some(dest), &["fetch", "-q", url, commit]).await?;
        self.git(Some(dest), &["reset", "--hard", "FETCH_HEAD"])
            .await?;
        self.git(Some(dest), &["submodule", "update", "--init", "--recursive"])
            .await?;

        write_marker(dest, commit)?;
        Ok(FetchOutcome::Cloned)
    }
}
