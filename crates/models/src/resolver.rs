//! Reconciliation of a workspace's model slots with the global store.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use cpack_core::hashing::digests_match;
use cpack_core::snapshot::ModelEntry;

use crate::acquire::{Acquired, Acquisition};
use crate::digest_cache::DigestCache;
use crate::download::Downloader;
use crate::error::ModelError;
use crate::link::{link_slot, slot_state, SlotState};
use crate::prompt::UserInput;
use crate::store::ModelStore;

/// How a resolution pass may acquire missing models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Prompt the user for models missing from the store. A non-interactive
    /// pass only adopts and links, leaving the rest pending.
    pub interactive: bool,
    /// Accept URLs during interactive acquisition.
    pub allow_network: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            interactive: true,
            allow_network: true,
        }
    }
}

/// What happened to a single manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOutcome {
    /// Slot already satisfied; nothing written.
    Present,
    /// A matching workspace file was moved into the store and linked.
    Adopted,
    /// Linked to an entry the store already held, or just acquired.
    Linked,
    /// Disabled and absent, or skipped by the user.
    Skipped,
    /// Missing from the store; left for an interactive pass.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelReport {
    pub filename: String,
    pub sha256: String,
    pub outcome: ModelOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    pub models: Vec<ModelReport>,
}

impl ResolveReport {
    pub fn count(&self, outcome: ModelOutcome) -> usize {
        self.models.iter().filter(|m| m.outcome == outcome).count()
    }

    /// Entries still missing after this pass.
    pub fn pending(&self) -> impl Iterator<Item = &ModelReport> {
        self.models
            .iter()
            .filter(|m| m.outcome == ModelOutcome::Pending)
    }
}

/// Resolves manifest models into a workspace.
///
/// Resolution is idempotent: a second pass over a fully linked workspace
/// reports every entry as [`ModelOutcome::Present`] and writes nothing.
pub struct ModelResolver<U, D> {
    store: ModelStore,
    cache: DigestCache,
    input: U,
    downloader: D,
}

impl<U: UserInput, D: Downloader> ModelResolver<U, D> {
    pub fn new(store: ModelStore, cache: DigestCache, input: U, downloader: D) -> Self {
        Self {
            store,
            cache,
            input,
            downloader,
        }
    }

    /// Give back the injected collaborators.
    pub fn into_parts(self) -> (DigestCache, U, D) {
        (self.cache, self.input, self.downloader)
    }

    /// Resolve every entry of `models` into `workspace`.
    ///
    /// Structural failures such as [`ModelError::LinkConflict`] abort the
    /// pass. The digest cache is saved before returning either way.
    pub fn resolve(
        &mut self,
        models: &[ModelEntry],
        workspace: &Path,
        options: ResolveOptions,
    ) -> Result<ResolveReport, ModelError> {
        if models.is_empty() {
            return Ok(ResolveReport::default());
        }
        self.store.ensure()?;

        let mut report = ResolveReport::default();
        let result: Result<(), ModelError> = models.iter().try_for_each(|entry| {
            let outcome = self.resolve_entry(entry, workspace, options)?;
            report.models.push(ModelReport {
                filename: entry.filename.clone(),
                sha256: entry.sha256.clone(),
                outcome,
            });
            Ok(())
        });

        if let Err(e) = self.cache.save() {
            tracing::warn!(error = %e, "Failed to save digest cache");
        }
        result?;

        tracing::info!(
            present = report.count(ModelOutcome::Present),
            adopted = report.count(ModelOutcome::Adopted),
            linked = report.count(ModelOutcome::Linked),
            skipped = report.count(ModelOutcome::Skipped),
            pending = report.count(ModelOutcome::Pending),
            "Model resolution pass finished",
        );
        Ok(report)
    }

    fn resolve_entry(
        &mut self,
        entry: &ModelEntry,
        workspace: &Path,
        options: ResolveOptions,
    ) -> Result<ModelOutcome, ModelError> {
        let sha = entry.sha256.as_str();
        let slot = slot_path(workspace, &entry.filename)?;
        let stored = self.store.path_for(sha);
        let in_store = self.store.contains(sha);

        match slot_state(&slot, &stored)? {
            SlotState::Linked if in_store => {
                tracing::debug!(filename = %entry.filename, "Model already linked");
                Ok(ModelOutcome::Present)
            }
            SlotState::Regular => self.settle_regular_file(entry, &slot, in_store),
            _ if in_store => {
                link_slot(&stored, &slot)?;
                tracing::info!(filename = %entry.filename, "Model already exists in cache");
                Ok(ModelOutcome::Linked)
            }
            _ if entry.disabled => Ok(ModelOutcome::Skipped),
            _ if !options.interactive => Ok(ModelOutcome::Pending),
            _ => {
                let acquired = Acquisition {
                    store: &self.store,
                    input: &mut self.input,
                    downloader: &self.downloader,
                    allow_network: options.allow_network,
                }
                .run(entry, &slot)?;
                Ok(match acquired {
                    Acquired::Linked => ModelOutcome::Linked,
                    Acquired::Skipped => ModelOutcome::Skipped,
                })
            }
        }
    }

    /// A regular file occupies the slot. It is adopted into the store when
    /// its digest matches and the store lacks the entry, kept in place when
    /// the store already has it, and reported as a conflict otherwise.
    fn settle_regular_file(
        &mut self,
        entry: &ModelEntry,
        slot: &Path,
        in_store: bool,
    ) -> Result<ModelOutcome, ModelError> {
        if !slot.is_file() {
            tracing::warn!(filename = %entry.filename, "Model slot is occupied by a directory");
            return Err(ModelError::LinkConflict {
                path: slot.to_path_buf(),
            });
        }

        let actual = self.cache.digest(slot)?;
        if !digests_match(&actual, &entry.sha256) {
            tracing::warn!(
                filename = %entry.filename,
                expected = %entry.sha256,
                actual = %actual,
                "Workspace file does not match manifest digest",
            );
            return Err(ModelError::LinkConflict {
                path: slot.to_path_buf(),
            });
        }

        if in_store {
            return Ok(ModelOutcome::Present);
        }

        let stored = self.store.adopt(slot, &entry.sha256)?;
        link_slot(&stored, slot)?;
        Ok(ModelOutcome::Adopted)
    }
}

/// Slot path of a manifest filename, which always uses `/` separators.
///
/// Only plain relative names are accepted: absolute paths, empty segments,
/// `.` and `..` are rejected before anything touches the filesystem.
fn slot_path(workspace: &Path, filename: &str) -> Result<PathBuf, ModelError> {
    let mut path = workspace.to_path_buf();
    for part in filename.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => path.push(name),
            _ => return Err(ModelError::InvalidFilename(filename.to_string())),
        }
    }
    Ok(path)
}
