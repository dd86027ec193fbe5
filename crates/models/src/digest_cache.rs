//! Persisted SHA-256 digests keyed by file path.
//!
//! Hashing multi-gigabyte checkpoints is slow, so digests are remembered in
//! `.sha_cache.json` together with the file's size and modification time.
//! A cached digest is reused only while both still match.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use cpack_core::hashing::sha256_file;

use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CacheEntry {
    size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    modified: u64,
    sha256: String,
}

#[derive(Debug, Default)]
pub struct DigestCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

impl DigestCache {
    /// Cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache file at `path`.
    ///
    /// A missing or unreadable file yields an empty cache; it is rewritten
    /// on the next [`save`](Self::save).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt digest cache");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path: Some(path),
            entries,
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SHA-256 of `file`, from the cache when size and mtime are unchanged.
    pub fn digest(&mut self, file: &Path) -> Result<String, ModelError> {
        let canonical = std::fs::canonicalize(file).map_err(ModelError::io(file))?;
        let meta = std::fs::metadata(&canonical).map_err(ModelError::io(file))?;
        let size = meta.len();
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        let key = canonical.to_string_lossy().into_owned();
        if let Some(entry) = self.entries.get(&key) {
            if entry.size == size && entry.modified == modified {
                tracing::debug!(path = %key, "Digest cache hit");
                return Ok(entry.sha256.clone());
            }
        }

        tracing::info!(path = %file.display(), size, "Hashing file");
        let sha256 = sha256_file(&canonical)?;
        self.entries.insert(
            key,
            CacheEntry {
                size,
                modified,
                sha256: sha256.clone(),
            },
        );
        self.dirty = true;
        Ok(sha256)
    }

    /// Write the cache back if anything changed since it was loaded.
    ///
    /// Entries for files that no longer exist, such as adopted workspace
    /// copies, are dropped first.
    pub fn save(&mut self) -> Result<(), ModelError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| Path::new(key).exists());
        if self.entries.len() != before {
            tracing::debug!(pruned = before - self.entries.len(), "Pruned stale digest cache entries");
            self.dirty = true;
        }

        let Some(path) = self.path.as_ref().filter(|_| self.dirty) else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ModelError::io(parent))?;
        }
        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| ModelError::Io {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?;
        std::fs::write(path, text).map_err(ModelError::io(path))?;

        self.dirty = false;
        Ok(())
    }
}
