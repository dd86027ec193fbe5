//! Packing a workspace into a pack archive.
//!
//! The archive records what is needed to rebuild the workspace elsewhere:
//! the ComfyUI commit, the Python version and its frozen requirements, the
//! custom node checkouts, the digests of untracked model files, the
//! workflow itself and the input files it loads. Model weights are never
//! bundled; they are located again by digest on restore.

use std::collections::BTreeSet;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use cpack_core::snapshot::{CustomNode, ModelEntry, Snapshot, SNAPSHOT_FILE};
use cpack_core::workflow::{portable_path, string_inputs};
use cpack_models::DigestCache;

use crate::archive::{INPUT_DIR, REQUIREMENTS_FILE, WORKFLOW_API_FILE, WORKFLOW_UI_FILE};
use crate::custom_nodes::{install_python, CUSTOM_NODES_DIR};
use crate::error::WorkspaceError;
use crate::subprocess::{command_output, Verbosity};

/// Directory scanned for model files.
pub const MODELS_DIR: &str = "models";

/// Checkout directory of a git repository.
const GIT_DIR: &str = ".git";

/// Suffix ComfyUI gives disabled plugin directories.
const DISABLED_SUFFIX: &str = ".disabled";

// ---------------------------------------------------------------------------
// Inspector
// ---------------------------------------------------------------------------

/// Facts about a workspace that only its tools know.
pub trait WorkspaceInspector: Send + Sync {
    /// Commit the ComfyUI checkout at `workspace` is at.
    fn comfyui_commit(
        &self,
        workspace: &Path,
    ) -> impl Future<Output = Result<String, WorkspaceError>> + Send;

    /// Files below `workspace/dir` that git does not track, as
    /// `/`-separated paths relative to `workspace`.
    fn untracked_files(
        &self,
        workspace: &Path,
        dir: &str,
    ) -> impl Future<Output = Result<Vec<String>, WorkspaceError>> + Send;

    /// Remote URL and HEAD commit of the checkout at `repo`.
    fn checkout_origin(
        &self,
        repo: &Path,
    ) -> impl Future<Output = Result<(String, String), WorkspaceError>> + Send;

    /// `major.minor` version of the `python` interpreter.
    fn python_version(
        &self,
        python: &Path,
    ) -> impl Future<Output = Result<String, WorkspaceError>> + Send;

    /// Pinned requirements of the environment `python` belongs to.
    fn freeze_requirements(
        &self,
        python: &Path,
    ) -> impl Future<Output = Result<String, WorkspaceError>> + Send;
}

/// [`WorkspaceInspector`] asking `git` and the workspace's Python.
#[derive(Debug, Clone, Default)]
pub struct CliInspector {
    pub verbosity: Verbosity,
}

impl CliInspector {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> Result<String, WorkspaceError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(cwd);
        command_output(&mut cmd, self.verbosity).await
    }
}

impl WorkspaceInspector for CliInspector {
    async fn comfyui_commit(&self, workspace: &Path) -> Result<String, WorkspaceError> {
        Ok(self.git(workspace, &["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    async fn untracked_files(
        &self,
        workspace: &Path,
        dir: &str,
    ) -> Result<Vec<String>, WorkspaceError> {
        let listing = self
            .git(workspace, &["ls-files", "--others", "-z", "--", dir])
            .await?;
        Ok(listing
            .split('\0')
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn checkout_origin(&self, repo: &Path) -> Result<(String, String), WorkspaceError> {
        let url = self
            .git(repo, &["config", "--get", "remote.origin.url"])
            .await?;
        let commit = self.git(repo, &["rev-parse", "HEAD"]).await?;
        Ok((url.trim().to_string(), commit.trim().to_string()))
    }

    async fn python_version(&self, python: &Path) -> Result<String, WorkspaceError> {
        let mut cmd = Command::new(python);
        cmd.args(["-c", "import sys; print('%d.%d' % sys.version_info[:2])"]);
        Ok(command_output(&mut cmd, self.verbosity)
            .await?
            .trim()
            .to_string())
    }

    async fn freeze_requirements(&self, python: &Path) -> Result<String, WorkspaceError> {
        let mut cmd = Command::new(python);
        cmd.args(["-m", "pip", "freeze", "--exclude-editable"]);
        command_output(&mut cmd, self.verbosity).await
    }
}

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PackReport {
    pub archive: PathBuf,
    pub comfyui_commit: String,
    pub python: String,
    pub custom_nodes: usize,
    pub models: usize,
    pub input_files: usize,
}

/// Everything written into an archive.
struct PackContents {
    snapshot: Snapshot,
    requirements: String,
    workflow_api: Value,
    workflow: Option<Value>,
    /// `(name below input/, source file)`.
    inputs: Vec<(String, PathBuf)>,
}

/// Pack `workspace` and the workflow it serves into `archive`.
///
/// `workflow_api` is the API-format export; `workflow` the optional
/// UI-format one. Only input files the workflow names are bundled. Model
/// files are hashed through `cache`, which is saved and handed back.
pub async fn pack_workspace<I: WorkspaceInspector>(
    workspace: &Path,
    workflow_api: &Value,
    workflow: Option<&Value>,
    archive: &Path,
    inspector: &I,
    cache: DigestCache,
) -> Result<(PackReport, DigestCache), WorkspaceError> {
    let referenced = string_inputs(workflow_api)?;

    let comfyui = inspector.comfyui_commit(workspace).await?;
    tracing::info!(commit = %comfyui, "Packing ComfyUI checkout");

    let python_bin = install_python(workspace);
    let python = inspector.python_version(&python_bin).await?;
    let requirements = inspector.freeze_requirements(&python_bin).await?;
    tracing::info!(python = %python, "Froze Python requirements");

    let custom_nodes = collect_custom_nodes(inspector, workspace).await?;
    tracing::info!(count = custom_nodes.len(), "Collected custom nodes");

    let untracked = inspector.untracked_files(workspace, MODELS_DIR).await?;
    let root = workspace.to_path_buf();
    let names = referenced.clone();
    let (models, cache) = tokio::task::spawn_blocking(move || {
        let mut cache = cache;
        let models = collect_models(&root, &untracked, &names, &mut cache);
        if let Err(e) = cache.save() {
            tracing::warn!(error = %e, "Failed to save digest cache");
        }
        (models, cache)
    })
    .await
    .map_err(|e| WorkspaceError::Task(e.to_string()))?;
    let models = models?;
    tracing::info!(count = models.len(), "Hashed model files");

    let inputs = collect_inputs(&workspace.join(INPUT_DIR), &referenced)?;

    let contents = PackContents {
        snapshot: Snapshot {
            comfyui: comfyui.clone(),
            python: python.clone(),
            custom_nodes,
            models,
        },
        requirements,
        workflow_api: workflow_api.clone(),
        workflow: workflow.cloned(),
        inputs,
    };
    let report = PackReport {
        archive: archive.to_path_buf(),
        comfyui_commit: comfyui,
        python,
        custom_nodes: contents.snapshot.custom_nodes.len(),
        models: contents.snapshot.models.len(),
        input_files: contents.inputs.len(),
    };

    let dest = archive.to_path_buf();
    tokio::task::spawn_blocking(move || write_archive(&dest, &contents))
        .await
        .map_err(|e| WorkspaceError::Task(e.to_string()))??;

    tracing::info!(archive = %archive.display(), "Workspace packed");
    Ok((report, cache))
}

/// Git checkouts under `custom_nodes/`, sorted by directory name.
async fn collect_custom_nodes<I: WorkspaceInspector>(
    inspector: &I,
    workspace: &Path,
) -> Result<Vec<CustomNode>, WorkspaceError> {
    let dir = workspace.join(CUSTOM_NODES_DIR);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(WorkspaceError::io(&dir)(e)),
    };

    let mut repos = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(WorkspaceError::io(&dir))? {
        let path = entry.path();
        if path.is_dir() && path.join(GIT_DIR).exists() {
            repos.push(path);
        }
    }
    repos.sort();

    let mut nodes = Vec::with_capacity(repos.len());
    for repo in repos {
        let (url, commit_hash) = inspector.checkout_origin(&repo).await?;
        let disabled = repo
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(DISABLED_SUFFIX));
        tracing::debug!(url = %url, commit = %commit_hash, disabled, "Found custom node");
        nodes.push(CustomNode {
            url,
            commit_hash,
            disabled,
        });
    }
    Ok(nodes)
}

/// Manifest entries for the untracked files under `models/`.
///
/// Hidden files and anything that is not a readable file are left out.
/// A model is `explicit` when the workflow names its file.
fn collect_models(
    workspace: &Path,
    files: &[String],
    referenced: &BTreeSet<String>,
    cache: &mut DigestCache,
) -> Result<Vec<ModelEntry>, WorkspaceError> {
    let mut models = Vec::new();
    for filename in files {
        let name = filename.rsplit('/').next().unwrap_or_default();
        if name.is_empty() || name.starts_with('.') {
            continue;
        }

        let path = filename
            .split('/')
            .fold(workspace.to_path_buf(), |path, part| path.join(part));
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "Skipping non-file model entry");
            continue;
        }

        let size = std::fs::metadata(&path)
            .map_err(WorkspaceError::io(&path))?
            .len();
        let sha256 = cache.digest(&path)?;
        models.push(ModelEntry {
            filename: filename.clone(),
            sha256,
            disabled: false,
            size: Some(size),
            explicit: Some(referenced.contains(name)),
        });
    }
    Ok(models)
}

/// Files below `input_dir` whose name the workflow refers to, keyed by
/// their `/`-separated path relative to `input_dir`.
fn collect_inputs(
    input_dir: &Path,
    referenced: &BTreeSet<String>,
) -> Result<Vec<(String, PathBuf)>, WorkspaceError> {
    let mut found = Vec::new();
    walk_inputs(input_dir, input_dir, referenced, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk_inputs(
    root: &Path,
    dir: &Path,
    referenced: &BTreeSet<String>,
    found: &mut Vec<(String, PathBuf)>,
) -> Result<(), WorkspaceError> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(dir).map_err(WorkspaceError::io(dir))? {
        let path = entry.map_err(WorkspaceError::io(dir))?.path();
        if path.is_dir() {
            walk_inputs(root, &path, referenced, found)?;
            continue;
        }

        let used = path
            .file_name()
            .is_some_and(|name| referenced.contains(name.to_string_lossy().as_ref()));
        if used && path.is_file() {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            found.push((portable_path(relative), path.clone()));
        }
    }
    Ok(())
}

/// Write `contents` as a zip at `archive`.
///
/// The zip is assembled in a temporary file next to `archive` and moved
/// into place once complete.
fn write_archive(archive: &Path, contents: &PackContents) -> Result<(), WorkspaceError> {
    let dir = archive
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(WorkspaceError::io(dir))?;

    let staging = tempfile::NamedTempFile::new_in(dir).map_err(WorkspaceError::io(dir))?;
    let mut zip = ZipWriter::new(staging.as_file());
    let options = SimpleFileOptions::default();
    let io = |e: std::io::Error| WorkspaceError::Io {
        path: archive.to_path_buf(),
        source: e,
    };

    let requirements = format!("{}\n", contents.requirements.trim_end_matches('\n'));
    add_file(&mut zip, REQUIREMENTS_FILE, requirements.as_bytes(), options)?;
    add_file(&mut zip, SNAPSHOT_FILE, &to_pretty(&contents.snapshot)?, options)?;
    add_file(&mut zip, WORKFLOW_API_FILE, &to_pretty(&contents.workflow_api)?, options)?;
    if let Some(workflow) = &contents.workflow {
        add_file(&mut zip, WORKFLOW_UI_FILE, &to_pretty(workflow)?, options)?;
    }

    for (name, source) in &contents.inputs {
        zip.start_file(format!("{INPUT_DIR}/{name}"), options)
            .map_err(archive_error)?;
        let mut file = std::fs::File::open(source).map_err(WorkspaceError::io(source))?;
        std::io::copy(&mut file, &mut zip).map_err(io)?;
    }

    zip.finish().map_err(archive_error)?;
    staging
        .persist(archive)
        .map_err(|e| WorkspaceError::io(archive)(e.error))?;
    Ok(())
}

fn add_file<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    body: &[u8],
    options: SimpleFileOptions,
) -> Result<(), WorkspaceError> {
    zip.start_file(name, options).map_err(archive_error)?;
    zip.write_all(body)
        .map_err(|e| WorkspaceError::Archive(format!("{name}: {e}")))
}

fn to_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>, WorkspaceError> {
    serde_json::to_vec_pretty(value).map_err(|e| WorkspaceError::Archive(e.to_string()))
}

fn archive_error(e: zip::result::ZipError) -> WorkspaceError {
    WorkspaceError::Archive(e.to_string())
}
