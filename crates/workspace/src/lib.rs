//! Packing ComfyUI workspaces into archives, restoring them, and running
//! workflows in them.
//!
//! External tools do the heavy lifting: `git` checks out ComfyUI and its
//! custom nodes, `uv` builds the Python environment and the `comfy` CLI
//! serves and runs workflows. This crate sequences them and hands model
//! files to `cpack-models`.

pub mod archive;
pub mod custom_nodes;
pub mod error;
pub mod fetcher;
pub mod installer;
pub mod pack;
pub mod restore;
pub mod runner;
pub mod subprocess;

pub use error::WorkspaceError;
pub use fetcher::{FetchOutcome, GitFetcher, RepositoryFetcher};
pub use installer::{DependencyInstaller, UvInstaller};
pub use pack::{pack_workspace, CliInspector, PackReport, WorkspaceInspector};
pub use restore::{restore_workspace, RestoreOptions, RestoreReport};
pub use runner::WorkflowRunner;
pub use subprocess::Verbosity;
