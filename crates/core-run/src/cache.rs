//! Run-scoped file cache.
//!
//! Keys are canonical absolute paths (symlinks resolved) so two references to
//! the same file share one buffer. `before` is the disk content at first
//! load, which is exactly what snapshots must capture.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};

use core_edit::{OpStatus, SourceBuffer};

#[derive(Debug)]
pub struct FileEntry {
    pub canonical: PathBuf,
    /// Path relative to the run root, used for snapshots and reporting.
    pub rel: PathBuf,
    /// Disk content when the run first referenced the file.
    pub before: String,
    pub buffer: SourceBuffer,
    /// Set once any op applied an edit to this buffer.
    pub touched: bool,
}

#[derive(Debug)]
pub enum ResolveError {
    /// The canonical path is not strictly beneath the run root. Such files
    /// are never read or written.
    OutsideRoot(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ResolveError {
    pub fn status(&self) -> OpStatus {
        match self {
            ResolveError::OutsideRoot(_) => OpStatus::FailedInvalidPath,
            ResolveError::Io { .. } => OpStatus::FailedIo,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ResolveError::OutsideRoot(path) => {
                format!("path resolves outside the project root: {}", path.display())
            }
            ResolveError::Io { path, source } => {
                format!("cannot read {}: {source}", path.display())
            }
        }
    }
}

pub struct FileCache {
    root: PathBuf,
    entries: BTreeMap<PathBuf, FileEntry>,
}

impl FileCache {
    /// `root` must already be canonical.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            entries: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a bundle file reference, loading the file on first use.
    pub fn entry(&mut self, file_ref: &str) -> Result<&mut FileEntry, ResolveError> {
        let joined = if Path::new(file_ref).is_absolute() {
            PathBuf::from(file_ref)
        } else {
            self.root.join(file_ref)
        };
        let canonical = fs::canonicalize(&joined).map_err(|source| ResolveError::Io {
            path: joined.clone(),
            source,
        })?;
        if canonical == self.root || !canonical.starts_with(&self.root) {
            return Err(ResolveError::OutsideRoot(canonical));
        }
        match self.entries.entry(canonical.clone()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let before =
                    fs::read_to_string(&canonical).map_err(|source| ResolveError::Io {
                        path: canonical.clone(),
                        source,
                    })?;
                let rel = canonical
                    .strip_prefix(&self.root)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| canonical.clone());
                let buffer = SourceBuffer::from_text(&before);
                Ok(slot.insert(FileEntry {
                    canonical,
                    rel,
                    before,
                    buffer,
                    touched: false,
                }))
            }
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut FileEntry> {
        self.entries.values_mut()
    }
}
