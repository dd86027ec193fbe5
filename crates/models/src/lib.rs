//! Content-addressed model store and workspace model resolution.
//!
//! Model weight files live once in a global store, named by their SHA-256
//! digest. Workspaces expose them through symlinks at the path recorded in
//! the snapshot manifest. [`ModelResolver`] reconciles a workspace with the
//! store, adopting files already present and falling back to interactive
//! acquisition for the rest.

pub mod acquire;
pub mod digest_cache;
pub mod download;
pub mod error;
pub mod link;
pub mod prompt;
pub mod resolver;
pub mod search;
pub mod store;

pub use digest_cache::DigestCache;
pub use download::{Downloader, HttpDownloader};
pub use error::ModelError;
pub use prompt::{Reply, TerminalInput, UserInput};
pub use resolver::{ModelOutcome, ModelResolver, ResolveOptions, ResolveReport};
pub use store::ModelStore;
