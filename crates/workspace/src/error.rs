use std::path::PathBuf;

use cpack_core::error::CoreError;
use cpack_models::ModelError;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Command '{program}' failed with exit code {exit_code}")]
    CommandFailed { program: String, exit_code: i32 },

    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Invalid pack archive: {0}")]
    Archive(String),

    #[error("ComfyUI runner is already started")]
    AlreadyStarted,

    #[error("ComfyUI runner is not started yet")]
    NotStarted,

    #[error("ComfyUI server did not respond: {0}")]
    ServerUnreachable(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
