//! End-to-end restore with fake git and Python collaborators.
#![cfg(unix)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use cpack_core::hashing::sha256_hex;
use cpack_models::{DigestCache, Downloader, ModelError, ModelResolver, ModelStore, Reply, UserInput};
use cpack_workspace::fetcher::{is_checked_out, write_marker};
use cpack_workspace::{
    restore_workspace, DependencyInstaller, FetchOutcome, RepositoryFetcher, RestoreOptions,
    WorkspaceError,
};
use zip::write::SimpleFileOptions;

const WEIGHTS: &[u8] = b"checkpoint weights";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Journal {
    steps: Mutex<Vec<String>>,
}

impl Journal {
    fn push(&self, step: String) {
        self.steps.lock().unwrap().push(step);
    }

    fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }
}

struct FakeFetcher<'a> {
    journal: &'a Journal,
}

impl RepositoryFetcher for FakeFetcher<'_> {
    async fn clone_and_checkout(
        &self,
        url: &str,
        commit: &str,
        dest: &Path,
    ) -> Result<FetchOutcome, WorkspaceError> {
        if is_checked_out(dest, commit) {
            return Ok(FetchOutcome::AlreadyPresent);
        }
        std::fs::create_dir_all(dest).unwrap();
        write_marker(dest, commit)?;
        self.journal.push(format!("clone {url}@{commit}"));
        Ok(FetchOutcome::Cloned)
    }
}

struct FakeInstaller<'a> {
    journal: &'a Journal,
}

impl DependencyInstaller for FakeInstaller<'_> {
    async fn install(
        &self,
        python_version: &str,
        requirements: &Path,
        workspace: &Path,
    ) -> Result<PathBuf, WorkspaceError> {
        assert!(requirements.is_file());
        self.journal.push(format!("install python {python_version}"));
        Ok(workspace.join(".venv/bin/python"))
    }
}

struct NoPrompt;

impl UserInput for NoPrompt {
    fn ask(&mut self, prompt: &str) -> Result<Reply, ModelError> {
        panic!("unexpected prompt: {prompt}");
    }

    fn notify(&mut self, _message: &str) {}
}

struct NoNetwork;

impl Downloader for NoNetwork {
    fn download(&self, url: &str, _dest: &Path, _label: &str) -> Result<u64, ModelError> {
        panic!("unexpected download of {url}");
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn write_pack(path: &Path, model_sha: &str) {
    let snapshot = serde_json::json!({
        "comfyui": "4f5812b9",
        "python": "3.11",
        "custom_nodes": [
            {"url": "https://github.com/org/ComfyUI-Impact-Pack.git", "commit_hash": "aaa111"}
        ],
        "models": [
            {"filename": "models/checkpoints/sd15.safetensors", "sha256": model_sha},
            {"filename": "models/loras/missing.safetensors", "sha256": "ff00", "disabled": true}
        ]
    });

    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    zip.start_file("snapshot.json", options).unwrap();
    zip.write_all(snapshot.to_string().as_bytes()).unwrap();
    zip.start_file("requirements.txt", options).unwrap();
    zip.write_all(b"torch==2.3.0\n").unwrap();
    zip.start_file("workflow_api.json", options).unwrap();
    zip.write_all(br#"{"1": {"class_type": "CPackInputString", "inputs": {"value": "hi"}}}"#)
        .unwrap();
    zip.start_file("input/example.png", options).unwrap();
    zip.write_all(b"png").unwrap();
    zip.finish().unwrap();
}

fn options() -> RestoreOptions {
    RestoreOptions {
        interactive: true,
        allow_network: false,
        ..RestoreOptions::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restores_workspace_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let sha = sha256_hex(WEIGHTS);
    let pack = dir.path().join("demo.cpack.zip");
    write_pack(&pack, &sha);

    let store = ModelStore::new(dir.path().join("home/models"));
    store.ensure().unwrap();
    std::fs::write(store.path_for(&sha), WEIGHTS).unwrap();

    let workspace = dir.path().join("workspace");
    let journal = Journal::default();
    let resolver = ModelResolver::new(store.clone(), DigestCache::in_memory(), NoPrompt, NoNetwork);

    let (report, _) = restore_workspace(
        &pack,
        &workspace,
        &FakeFetcher { journal: &journal },
        &FakeInstaller { journal: &journal },
        resolver,
        options(),
    )
    .await
    .unwrap();

    assert_eq!(
        journal.steps(),
        vec![
            "clone https://github.com/comfyanonymous/ComfyUI.git@4f5812b9".to_string(),
            "install python 3.11".to_string(),
            "clone https://github.com/org/ComfyUI-Impact-Pack.git@aaa111".to_string(),
        ]
    );
    assert_eq!(report.comfyui_commit, "4f5812b9");
    assert_eq!(report.input_files, 1);
    assert!(workspace.join("input/example.png").is_file());
    assert_eq!(report.workflow_api, Some(workspace.join("workflow_api.json")));
    assert!(workspace.join("workflow_api.json").is_file());
    assert!(workspace.join("custom_nodes/ComfyUI-Impact-Pack").is_dir());
    assert_eq!(
        std::fs::read_link(workspace.join("models/checkpoints/sd15.safetensors")).unwrap(),
        store.path_for(&sha)
    );
    assert!(!workspace.join("models/loras/missing.safetensors").exists());
}

#[tokio::test]
async fn second_restore_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let sha = sha256_hex(WEIGHTS);
    let pack = dir.path().join("demo.cpack.zip");
    write_pack(&pack, &sha);

    let store = ModelStore::new(dir.path().join("home/models"));
    store.ensure().unwrap();
    std::fs::write(store.path_for(&sha), WEIGHTS).unwrap();

    let workspace = dir.path().join("workspace");
    let journal = Journal::default();
    let fetcher = FakeFetcher { journal: &journal };
    let installer = FakeInstaller { journal: &journal };
    let resolver = ModelResolver::new(store, DigestCache::in_memory(), NoPrompt, NoNetwork);

    let (_, resolver) = restore_workspace(&pack, &workspace, &fetcher, &installer, resolver, options())
        .await
        .unwrap();
    let (report, _) = restore_workspace(&pack, &workspace, &fetcher, &installer, resolver, options())
        .await
        .unwrap();

    let clones = journal.steps().iter().filter(|s| s.starts_with("clone")).count();
    assert_eq!(clones, 2);
    assert_eq!(
        report.models.count(cpack_models::ModelOutcome::Present),
        1
    );
}

#[tokio::test]
async fn missing_pack_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::default();
    let resolver = ModelResolver::new(
        ModelStore::new(dir.path().join("store")),
        DigestCache::in_memory(),
        NoPrompt,
        NoNetwork,
    );

    let result = restore_workspace(
        &dir.path().join("absent.zip"),
        &dir.path().join("ws"),
        &FakeFetcher { journal: &journal },
        &FakeInstaller { journal: &journal },
        resolver,
        options(),
    )
    .await;

    assert!(matches!(result, Err(WorkspaceError::Io { .. })));
    assert!(journal.steps().is_empty());
}
