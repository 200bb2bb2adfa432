//! Run manager: drives a bundle through locate, edit, write-back
//! verification and rollback, persists the transactional run directory, and
//! reverts prior runs from their snapshots.
//!
//! A run owns all cross-operation state. The in-memory file cache is the
//! single source of truth while ops execute, so later ops observe earlier
//! ops' edits; snapshots always capture the pre-run disk state.

use thiserror::Error;

mod cache;
mod engine;
mod hash;
mod manifest;
mod revert;
mod stamp;

pub use cache::{FileCache, FileEntry, ResolveError};
pub use engine::{RunMode, RunReport, execute};
pub use hash::sha256_hex;
pub use manifest::{Manifest, OpResult, TouchedFile, render_packet, render_summary, totals};
pub use revert::{RevertOutcome, list_runs, revert_run};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Bundle(#[from] core_bundle::BundleError),
    /// The tree-sitter grammar failed to load. Nothing can be located or
    /// compile-checked without it, so the whole run is refused.
    #[error("language front-end unavailable: {0}")]
    Frontend(core_locate::LocateError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("run {stamp} not found")]
    RunNotFound { stamp: String },
    #[error("manifest for run {stamp} unreadable: {detail}")]
    Manifest { stamp: String, detail: String },
}

impl RunError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RunError::Io {
            context: context.into(),
            source,
        }
    }
}
