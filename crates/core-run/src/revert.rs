//! Whole-run revert from a persisted manifest and its snapshots.

use std::fs;
use std::path::{Component, Path};

use tracing::{info, warn};

use core_config::Settings;

use crate::manifest::Manifest;
use crate::{RunError, stamp};

/// How many restore errors the outcome keeps verbatim.
const MAX_REPORTED_ERRORS: usize = 5;

#[derive(Debug)]
pub struct RevertOutcome {
    pub stamp: String,
    pub restored: usize,
    pub failed: usize,
    /// First few error lines, for the host dialog.
    pub errors: Vec<String>,
}

impl RevertOutcome {
    pub fn describe(&self) -> String {
        let mut out = format!(
            "revert {}: restored {} file(s), {} failure(s)",
            self.stamp, self.restored, self.failed
        );
        for error in &self.errors {
            out.push('\n');
            out.push_str(error);
        }
        out
    }
}

/// Recorded run stamps under this root, newest first.
pub fn list_runs(root: &Path, settings: &Settings) -> Vec<String> {
    let runs_root = root.join(&settings.runs_dirname);
    let Ok(read) = fs::read_dir(&runs_root) else {
        return Vec::new();
    };
    let mut stamps: Vec<String> = read
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| stamp::is_stamp_like(name))
        .collect();
    stamps.sort();
    stamps.reverse();
    stamps
}

/// Restore every file the run touched to its pre-run snapshot. Partial
/// success is reported, not raised; revert itself records no new run.
pub fn revert_run(root: &Path, settings: &Settings, stamp: &str) -> Result<RevertOutcome, RunError> {
    let root = fs::canonicalize(root)
        .map_err(|e| RunError::io(format!("cannot resolve root {}", root.display()), e))?;
    let run_dir = root.join(&settings.runs_dirname).join(stamp);
    if !run_dir.is_dir() {
        return Err(RunError::RunNotFound {
            stamp: stamp.to_string(),
        });
    }
    let manifest_text =
        fs::read_to_string(run_dir.join("manifest.json")).map_err(|e| RunError::Manifest {
            stamp: stamp.to_string(),
            detail: e.to_string(),
        })?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).map_err(|e| RunError::Manifest {
            stamp: stamp.to_string(),
            detail: e.to_string(),
        })?;

    let mut outcome = RevertOutcome {
        stamp: stamp.to_string(),
        restored: 0,
        failed: 0,
        errors: Vec::new(),
    };
    for touched in &manifest.touched {
        if escapes_root(&touched.rel) {
            outcome.failed += 1;
            outcome
                .errors
                .push(format!("{}: refusing path outside root", touched.rel));
            continue;
        }
        let snapshot = run_dir.join(&touched.snapshot_rel);
        let content = match fs::read_to_string(&snapshot) {
            Ok(content) => content,
            Err(e) => {
                outcome.failed += 1;
                outcome
                    .errors
                    .push(format!("{}: snapshot unreadable: {e}", touched.rel));
                continue;
            }
        };
        let dest = root.join(&touched.rel);
        if let Some(parent) = dest.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            outcome.failed += 1;
            outcome
                .errors
                .push(format!("{}: cannot recreate directory: {e}", touched.rel));
            continue;
        }
        match fs::write(&dest, content) {
            Ok(()) => {
                info!(target: "revert", file = touched.rel.as_str(), "restored");
                outcome.restored += 1;
            }
            Err(e) => {
                warn!(target: "revert", file = touched.rel.as_str(), error = %e, "restore_failed");
                outcome.failed += 1;
                outcome.errors.push(format!("{}: {e}", touched.rel));
            }
        }
    }
    outcome.errors.truncate(MAX_REPORTED_ERRORS);
    Ok(outcome)
}

/// Manifests are trusted data but cheap to sanity-check: a relative path
/// with parent components could walk out of the root.
fn escapes_root(rel: &str) -> bool {
    Path::new(rel)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_components() {
        assert!(escapes_root("../outside.py"));
        assert!(escapes_root("/etc/passwd"));
        assert!(!escapes_root("pkg/mod.py"));
    }
}
