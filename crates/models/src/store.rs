//! Global content-addressed model store.
//!
//! Every file in the store is named by the lowercase hex SHA-256 of its
//! contents. Partial writes go to a hidden staging file next to the final
//! name and are renamed into place once complete, so a store entry is never
//! observed half-written.

use std::path::{Path, PathBuf};

use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    /// Store rooted at `root`, made absolute against the current directory.
    ///
    /// Store paths become symlink targets, which must not be relative.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            root: std::path::absolute(&root).unwrap_or(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the store directory if needed.
    pub fn ensure(&self) -> Result<(), ModelError> {
        std::fs::create_dir_all(&self.root).map_err(ModelError::io(&self.root))
    }

    /// Final location of the entry for `sha256`.
    pub fn path_for(&self, sha256: &str) -> PathBuf {
        self.root.join(sha256.trim().to_lowercase())
    }

    /// Hidden staging file used while an entry is being written.
    pub fn staging_path(&self, sha256: &str) -> PathBuf {
        self.root
            .join(format!(".{}.partial", sha256.trim().to_lowercase()))
    }

    pub fn contains(&self, sha256: &str) -> bool {
        self.path_for(sha256).is_file()
    }

    /// Move a workspace file into the store.
    ///
    /// Falls back to copy-and-remove when the file lives on another
    /// filesystem.
    pub fn adopt(&self, src: &Path, sha256: &str) -> Result<PathBuf, ModelError> {
        self.ensure()?;
        let dest = self.path_for(sha256);

        if std::fs::rename(src, &dest).is_err() {
            self.import(src, sha256)?;
            std::fs::remove_file(src).map_err(ModelError::io(src))?;
        }

        tracing::info!(sha256, from = %src.display(), "Adopted model into store");
        Ok(dest)
    }

    /// Copy an external file into the store, leaving the source untouched.
    pub fn import(&self, src: &Path, sha256: &str) -> Result<PathBuf, ModelError> {
        self.ensure()?;
        let staging = self.staging_path(sha256);
        if let Err(e) = std::fs::copy(src, &staging) {
            self.discard_staging(sha256);
            return Err(ModelError::Io {
                path: src.to_path_buf(),
                source: e,
            });
        }
        self.commit_staging(sha256)
    }

    /// Rename the staging file of `sha256` to its final name.
    pub fn commit_staging(&self, sha256: &str) -> Result<PathBuf, ModelError> {
        let staging = self.staging_path(sha256);
        let dest = self.path_for(sha256);
        std::fs::rename(&staging, &dest).map_err(ModelError::io(&dest))?;
        tracing::debug!(sha256, path = %dest.display(), "Committed store entry");
        Ok(dest)
    }

    /// Remove a leftover staging file, if any.
    pub fn discard_staging(&self, sha256: &str) {
        let staging = self.staging_path(sha256);
        if staging.exists() {
            if let Err(e) = std::fs::remove_file(&staging) {
                tracing::warn!(path = %staging.display(), error = %e, "Failed to remove staging file");
            }
        }
    }
}
