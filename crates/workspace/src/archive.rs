//! Pack archives: zip files holding a snapshot and its companion files.
//!
//! Layout:
//!
//! ```text
//! snapshot.json        dependency manifest
//! requirements.txt     pinned Python packages
//! input/               files copied into the workspace's input/
//! workflow_api.json    optional API-format workflow
//! workflow.json        optional UI-format workflow
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use cpack_core::snapshot::{Snapshot, SNAPSHOT_FILE};

use crate::error::WorkspaceError;

pub const REQUIREMENTS_FILE: &str = "requirements.txt";
pub const INPUT_DIR: &str = "input";
pub const WORKFLOW_API_FILE: &str = "workflow_api.json";
pub const WORKFLOW_UI_FILE: &str = "workflow.json";

/// An archive extracted into a temporary directory.
///
/// The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct UnpackedPack {
    dir: TempDir,
    pub snapshot: Snapshot,
}

impl UnpackedPack {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn requirements(&self) -> PathBuf {
        self.root().join(REQUIREMENTS_FILE)
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root().join(INPUT_DIR)
    }

    /// The bundled API-format workflow, if the pack has one.
    pub fn workflow_api(&self) -> Option<PathBuf> {
        Some(self.root().join(WORKFLOW_API_FILE)).filter(|p| p.is_file())
    }
}

/// Extract `archive` and read its snapshot.
pub fn unpack(archive: &Path) -> Result<UnpackedPack, WorkspaceError> {
    let file = File::open(archive).map_err(WorkspaceError::io(archive))?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| WorkspaceError::Archive(e.to_string()))?;

    let dir = tempfile::Builder::new()
        .prefix("cpack-")
        .tempdir()
        .map_err(WorkspaceError::io(std::env::temp_dir()))?;
    zip.extract(dir.path())
        .map_err(|e| WorkspaceError::Archive(e.to_string()))?;

    let snapshot_path = dir.path().join(SNAPSHOT_FILE);
    if !snapshot_path.is_file() {
        return Err(WorkspaceError::Archive(format!(
            "{} does not contain {SNAPSHOT_FILE}",
            archive.display()
        )));
    }
    let snapshot = Snapshot::load(&snapshot_path)?;

    tracing::info!(
        archive = %archive.display(),
        comfyui = %snapshot.comfyui,
        custom_nodes = snapshot.custom_nodes.len(),
        models = snapshot.models.len(),
        "Unpacked pack archive",
    );
    Ok(UnpackedPack { dir, snapshot })
}

/// Recursively copy the contents of `src` into `dest`, overwriting files.
///
/// A missing `src` copies nothing.
pub fn copy_dir_contents(src: &Path, dest: &Path) -> Result<u64, WorkspaceError> {
    if !src.is_dir() {
        return Ok(0);
    }
    std::fs::create_dir_all(dest).map_err(WorkspaceError::io(dest))?;

    let mut copied = 0;
    for entry in std::fs::read_dir(src).map_err(WorkspaceError::io(src))? {
        let entry = entry.map_err(WorkspaceError::io(src))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            copied += copy_dir_contents(&from, &to)?;
        } else if from.is_file() {
            std::fs::copy(&from, &to).map_err(WorkspaceError::io(&from))?;
            copied += 1;
        }
    }
    Ok(copied)
}
