//! Domain logic for packaging and restoring ComfyUI workspaces.
//!
//! This crate has no I/O beyond reading files for hashing and listing
//! output directories. The model cache lives in `cpack-models` and the
//! restore pipeline in `cpack-workspace`.

pub mod error;
pub mod hashing;
pub mod home;
pub mod naming;
pub mod snapshot;
pub mod workflow;
