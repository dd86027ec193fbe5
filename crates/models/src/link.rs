//! Workspace model slots and the symlinks pointing them at the store.

use std::path::Path;

use crate::error::ModelError;

/// What currently occupies a workspace model slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing at the path.
    Empty,
    /// A symlink to the expected store entry.
    Linked,
    /// A symlink pointing somewhere else, or dangling.
    ForeignLink,
    /// A regular file (or directory). Never overwritten.
    Regular,
}

/// Inspect `slot` without following symlinks.
pub fn slot_state(slot: &Path, target: &Path) -> Result<SlotState, ModelError> {
    let meta = match std::fs::symlink_metadata(slot) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SlotState::Empty),
        Err(e) => {
            return Err(ModelError::Io {
                path: slot.to_path_buf(),
                source: e,
            })
        }
    };

    if !meta.file_type().is_symlink() {
        return Ok(SlotState::Regular);
    }

    let pointee = std::fs::read_link(slot).map_err(ModelError::io(slot))?;
    if pointee == target {
        Ok(SlotState::Linked)
    } else {
        Ok(SlotState::ForeignLink)
    }
}

/// Point `slot` at `target`, replacing an existing symlink.
///
/// Fails with [`ModelError::LinkConflict`] if a regular file is in the way.
pub fn link_slot(target: &Path, slot: &Path) -> Result<(), ModelError> {
    match slot_state(slot, target)? {
        SlotState::Linked => return Ok(()),
        SlotState::Regular => {
            return Err(ModelError::LinkConflict {
                path: slot.to_path_buf(),
            })
        }
        SlotState::ForeignLink => {
            std::fs::remove_file(slot).map_err(ModelError::io(slot))?;
        }
        SlotState::Empty => {}
    }

    if let Some(parent) = slot.parent() {
        std::fs::create_dir_all(parent).map_err(ModelError::io(parent))?;
    }
    symlink(target, slot).map_err(ModelError::io(slot))?;

    tracing::debug!(slot = %slot.display(), target = %target.display(), "Linked model slot");
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // -- link_slot ------------------------------------------------------------

    #[test]
    fn creates_parent_dirs_and_link() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("store_entry");
        std::fs::write(&target, b"w").unwrap();
        let slot = dir.path().join("models/checkpoints/a.safetensors");

        link_slot(&target, &slot).unwrap();
        assert_eq!(std::fs::read_link(&slot).unwrap(), target);
        assert_eq!(slot_state(&slot, &target).unwrap(), SlotState::Linked);
    }

    #[test]
    fn replaces_foreign_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("new");
        let slot = dir.path().join("slot");
        std::os::unix::fs::symlink(dir.path().join("old"), &slot).unwrap();
        assert_eq!(slot_state(&slot, &target).unwrap(), SlotState::ForeignLink);

        link_slot(&target, &slot).unwrap();
        assert_eq!(std::fs::read_link(&slot).unwrap(), target);
    }

    #[test]
    fn refuses_to_replace_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let slot = dir.path().join("slot");
        std::fs::write(&slot, b"user data").unwrap();

        let result = link_slot(&dir.path().join("target"), &slot);
        assert_matches!(result, Err(ModelError::LinkConflict { .. }));
        assert_eq!(std::fs::read(&slot).unwrap(), b"user data");
    }

    // -- slot_state -----------------------------------------------------------

    #[test]
    fn missing_slot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = slot_state(&dir.path().join("nope"), &dir.path().join("t")).unwrap();
        assert_eq!(state, SlotState::Empty);
    }
}
