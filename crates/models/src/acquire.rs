//! Interactive acquisition of a model missing from the store.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Prompt ──url──▶ Download ──▶ Verify ──ok──▶ Linked
//!   ▲  └──path──▶ LocalCopy ─┘    │
//!   │                             │ mismatch / error
//!   └─────────────────────────────┘
//! Prompt ──skip──▶ Skipped
//! ```
//!
//! Failures while fetching or verifying are reported through
//! [`UserInput::notify`] and lead back to `Prompt`. Only failing to link
//! the verified entry, or to read a reply at all, ends the loop with an
//! error.

use std::path::{Path, PathBuf};

use cpack_core::hashing::{digests_match, sha256_file};
use cpack_core::snapshot::ModelEntry;

use crate::download::Downloader;
use crate::error::ModelError;
use crate::link::link_slot;
use crate::prompt::{Reply, UserInput};
use crate::search::search_urls;
use crate::store::ModelStore;

const PROMPT: &str = "Enter a URL or the path to the downloaded file (or 'skip' to skip)";

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Prompt,
    Download { url: String },
    LocalCopy { path: PathBuf },
    Verify { candidate: Candidate },
    Linked,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidate {
    /// Downloaded into the store's staging file.
    Staged,
    /// A file supplied by the user, copied into the store once verified.
    Local(PathBuf),
}

/// Terminal state of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    Linked,
    Skipped,
}

/// Drives the acquisition of a single model entry.
pub struct Acquisition<'a, U: ?Sized, D: ?Sized> {
    pub store: &'a ModelStore,
    pub input: &'a mut U,
    pub downloader: &'a D,
    /// Accept URL replies.
    pub allow_network: bool,
}

impl<U, D> Acquisition<'_, U, D>
where
    U: UserInput + ?Sized,
    D: Downloader + ?Sized,
{
    /// Acquire `entry` and link it at `slot`.
    pub fn run(&mut self, entry: &ModelEntry, slot: &Path) -> Result<Acquired, ModelError> {
        let sha = entry.sha256.as_str();
        let (hf_url, civit_url) = search_urls(sha);
        self.input
            .notify(&format!("Please download model: {}", entry.filename));
        self.input.notify(&format!("HuggingFace search URL: {hf_url}"));
        self.input.notify(&format!("CivitAI search URL: {civit_url}"));

        let mut state = State::Prompt;
        loop {
            state = match state {
                State::Prompt => self.prompt()?,
                State::Download { url } => self.download(&url, entry),
                State::LocalCopy { path } => self.local_copy(path),
                State::Verify { candidate } => self.verify(candidate, sha),
                State::Linked => {
                    link_slot(&self.store.path_for(sha), slot)?;
                    self.input
                        .notify(&format!("Model {} installed successfully", entry.filename));
                    tracing::info!(filename = %entry.filename, sha256 = sha, "Model acquired");
                    return Ok(Acquired::Linked);
                }
                State::Skipped => {
                    tracing::info!(filename = %entry.filename, "Model skipped by user");
                    return Ok(Acquired::Skipped);
                }
            };
        }
    }

    fn prompt(&mut self) -> Result<State, ModelError> {
        Ok(match self.input.ask(PROMPT)? {
            Reply::Skip => State::Skipped,
            Reply::Url(_) if !self.allow_network => {
                self.input
                    .notify("Network access is disabled; provide a local file instead.");
                State::Prompt
            }
            Reply::Url(url) => State::Download { url },
            Reply::Path(path) => State::LocalCopy { path },
        })
    }

    fn download(&mut self, url: &str, entry: &ModelEntry) -> State {
        let sha = entry.sha256.as_str();
        if let Err(e) = self.store.ensure() {
            self.input.notify(&format!("Error processing file: {e}"));
            return State::Prompt;
        }

        let staging = self.store.staging_path(sha);
        match self.downloader.download(url, &staging, &entry.filename) {
            Ok(bytes) => {
                tracing::debug!(bytes, "Download completed, verifying");
                self.input.notify("Download completed! Verifying SHA256...");
                State::Verify {
                    candidate: Candidate::Staged,
                }
            }
            Err(e) => {
                self.store.discard_staging(sha);
                self.input.notify(&format!("Download failed: {e}"));
                State::Prompt
            }
        }
    }

    fn local_copy(&mut self, path: PathBuf) -> State {
        if !path.is_file() {
            self.input
                .notify(&format!("File does not exist: {}", path.display()));
            return State::Prompt;
        }
        self.input.notify("Verifying SHA256...");
        State::Verify {
            candidate: Candidate::Local(path),
        }
    }

    fn verify(&mut self, candidate: Candidate, sha: &str) -> State {
        let file = match &candidate {
            Candidate::Staged => self.store.staging_path(sha),
            Candidate::Local(path) => path.clone(),
        };

        let actual = match sha256_file(&file) {
            Ok(actual) => actual,
            Err(e) => {
                self.discard(&candidate, sha);
                self.input.notify(&format!("Error processing file: {e}"));
                return State::Prompt;
            }
        };

        if !digests_match(&actual, sha) {
            self.discard(&candidate, sha);
            self.input.notify(&format!(
                "SHA256 verification failed: {actual} != {sha}. The file may be corrupted or incorrect."
            ));
            return State::Prompt;
        }
        self.input.notify("SHA256 verification successful!");

        let stored = match &candidate {
            Candidate::Staged => self.store.commit_staging(sha),
            Candidate::Local(path) => self.store.import(path, sha),
        };
        match stored {
            Ok(_) => State::Linked,
            Err(e) => {
                self.discard(&candidate, sha);
                self.input.notify(&format!("Error processing file: {e}"));
                State::Prompt
            }
        }
    }

    fn discard(&self, candidate: &Candidate, sha: &str) {
        if *candidate == Candidate::Staged {
            self.store.discard_staging(sha);
        }
    }
}
