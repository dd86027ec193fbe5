//! Location of the shared comfy-pack home directory.
//!
//! The home holds the global model store, the default workspace root and
//! the persisted digest cache. It defaults to `~/.comfypack` and can be
//! moved with the `CPACK_HOME` environment variable.

use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Environment variable overriding the home directory.
pub const CPACK_HOME_ENV: &str = "CPACK_HOME";

/// Directory name used under the user's home when `CPACK_HOME` is unset.
pub const DEFAULT_HOME_DIR_NAME: &str = ".comfypack";

/// Git remote ComfyUI itself is installed from.
pub const COMFYUI_REPO: &str = "https://github.com/comfyanonymous/ComfyUI.git";

/// Resolved layout of the comfy-pack home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpackHome {
    root: PathBuf,
}

impl CpackHome {
    /// Use an explicit root directory, made absolute against the current
    /// directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            root: std::path::absolute(&root).unwrap_or(root),
        }
    }

    /// Resolve the home from the environment.
    ///
    /// | Env Var      | Default          |
    /// |--------------|------------------|
    /// | `CPACK_HOME` | `$HOME/.comfypack` |
    ///
    /// An empty `CPACK_HOME` is treated as unset.
    pub fn from_env() -> Result<Self, CoreError> {
        if let Some(root) = std::env::var_os(CPACK_HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }

        let user_home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Cannot locate the user home directory; set {CPACK_HOME_ENV}"
                ))
            })?;

        Ok(Self::new(PathBuf::from(user_home).join(DEFAULT_HOME_DIR_NAME)))
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Global content-addressed model store (`<root>/models`).
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    /// Default workspace root (`<root>/workspace`).
    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join("workspace")
    }

    /// Persisted digest cache (`<root>/.sha_cache.json`).
    pub fn sha_cache_file(&self) -> PathBuf {
        self.root.join(".sha_cache.json")
    }

    /// Create the root directory if it does not exist yet.
    pub fn ensure(&self) -> Result<(), CoreError> {
        if !self.root.exists() {
            tracing::info!(root = %self.root.display(), "Creating comfy-pack home");
        }
        std::fs::create_dir_all(&self.root).map_err(|source| CoreError::Io {
            path: self.root.clone(),
            source,
        })
    }
}
