//! Snapshot manifest recorded at packaging time (`snapshot.json`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// File name of the manifest inside a pack archive.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Dependencies captured when a workspace was packed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// ComfyUI git commit.
    pub comfyui: String,
    /// Python version string, e.g. `"3.11"`.
    pub python: String,
    #[serde(default)]
    pub custom_nodes: Vec<CustomNode>,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

/// A custom node plugin pinned to a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomNode {
    pub url: String,
    pub commit_hash: String,
    /// The plugin was disabled in the packed workspace.
    #[serde(default)]
    pub disabled: bool,
}

/// A model file required by the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Path relative to the workspace root, e.g. `models/checkpoints/sd.safetensors`.
    pub filename: String,
    /// Lowercase hex SHA-256 of the file contents.
    pub sha256: String,
    #[serde(default)]
    pub disabled: bool,
    /// File size in bytes, when the packer recorded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Whether a workflow input references the file by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit: Option<bool>,
}

impl Snapshot {
    /// Parse a snapshot from JSON text.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("Invalid snapshot manifest: {e}")))
    }

    /// Read and parse a snapshot file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

impl CustomNode {
    /// Directory name the plugin is checked out under `custom_nodes/`.
    ///
    /// Last URL path segment up to its first `.`, so
    /// `https://github.com/org/ComfyUI-Foo.git` becomes `ComfyUI-Foo`.
    /// Disabled plugins get the `.disabled` suffix ComfyUI itself uses.
    /// A URL that leaves nothing to name the directory after is rejected.
    pub fn directory_name(&self) -> Result<String, CoreError> {
        let segment = self
            .url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let base = segment.split('.').next().unwrap_or_default();
        if base.is_empty() || base.contains('\\') {
            return Err(CoreError::Validation(format!(
                "Cannot derive a custom node directory from '{}'",
                self.url
            )));
        }

        if self.disabled {
            Ok(format!("{base}.disabled"))
        } else {
            Ok(base.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot_json() -> &'static str {
        r#"{
            "comfyui": "4f5812b93712e0f52ae8fe80a89e8b5e7d0fa309",
            "python": "3.11",
            "custom_nodes": [
                {"url": "https://github.com/bentoml/comfy-pack.git", "commit_hash": "abc123"},
                {"url": "https://github.com/org/Old-Nodes", "commit_hash": "def456", "disabled": true}
            ],
            "models": [
                {"filename": "models/checkpoints/sd15.safetensors", "sha256": "aa", "size": 4, "explicit": true},
                {"filename": "models/vae/vae.pt", "sha256": "bb", "disabled": true}
            ]
        }"#
    }

    #[test]
    fn parses_full_manifest() {
        let snapshot = Snapshot::from_json(sample_snapshot_json()).unwrap();
        assert_eq!(snapshot.python, "3.11");
        assert_eq!(snapshot.custom_nodes.len(), 2);
        assert_eq!(snapshot.models[0].size, Some(4));
        assert!(!snapshot.models[0].disabled);
        assert!(snapshot.models[1].disabled);
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let snapshot = Snapshot::from_json(r#"{"comfyui": "abc", "python": "3.10"}"#).unwrap();
        assert!(snapshot.models.is_empty());
        assert!(snapshot.custom_nodes.is_empty());
    }

    #[test]
    fn malformed_manifest_is_validation_error() {
        let err = Snapshot::from_json(r#"{"python": "3.10"}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid snapshot manifest"));
    }

    #[test]
    fn custom_node_directory_name_strips_git_suffix() {
        let snapshot = Snapshot::from_json(sample_snapshot_json()).unwrap();
        assert_eq!(snapshot.custom_nodes[0].directory_name().unwrap(), "comfy-pack");
        assert_eq!(
            snapshot.custom_nodes[1].directory_name().unwrap(),
            "Old-Nodes.disabled"
        );
    }

    #[test]
    fn custom_node_directory_name_must_not_be_empty() {
        for url in [
            "https://github.com/org/.hidden",
            "https://github.com/org/..",
            "..",
            "",
        ] {
            let node = CustomNode {
                url: url.to_string(),
                commit_hash: "abc".to_string(),
                disabled: false,
            };
            assert!(
                matches!(node.directory_name(), Err(CoreError::Validation(_))),
                "{url:?} should be rejected"
            );
        }
    }
}
