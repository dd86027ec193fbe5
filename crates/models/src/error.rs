use std::path::PathBuf;

use cpack_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("{path} already exists and is not a symlink")]
    LinkConflict { path: PathBuf },

    #[error("Model filename '{0}' must be a relative path inside the workspace")]
    InvalidFilename(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Input error: {0}")]
    Prompt(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ModelError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
