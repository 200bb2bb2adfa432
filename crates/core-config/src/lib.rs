//! Patcher configuration.
//!
//! Compiled defaults cover every knob; an optional `patchpilot.toml` in the
//! project root may override them. Unknown fields are ignored and a malformed
//! file falls back to defaults, so a bad config can never block a run.

use serde::Deserialize;
use std::{fs, path::Path};
use tracing::{debug, warn};

pub const RUNS_DIRNAME: &str = "patch_runs";
pub const KEEP_RUNS: usize = 5;
pub const ROLLBACK_ON_COMPILE_FAIL: bool = true;
pub const DEFAULT_CONTEXT_LINES: usize = 25;
pub const CONFIG_FILE_NAME: &str = "patchpilot.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct RunsSection {
    #[serde(default = "RunsSection::default_dirname")]
    pub dirname: String,
    #[serde(default = "RunsSection::default_keep")]
    pub keep: usize,
}

impl RunsSection {
    fn default_dirname() -> String {
        RUNS_DIRNAME.to_string()
    }
    const fn default_keep() -> usize {
        KEEP_RUNS
    }
}

impl Default for RunsSection {
    fn default() -> Self {
        Self {
            dirname: Self::default_dirname(),
            keep: Self::default_keep(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerifySection {
    #[serde(default = "VerifySection::default_rollback")]
    pub rollback_on_compile_fail: bool,
    #[serde(default = "VerifySection::default_context_lines")]
    pub context_lines: usize,
}

impl VerifySection {
    const fn default_rollback() -> bool {
        ROLLBACK_ON_COMPILE_FAIL
    }
    const fn default_context_lines() -> usize {
        DEFAULT_CONTEXT_LINES
    }
}

impl Default for VerifySection {
    fn default() -> Self {
        Self {
            rollback_on_compile_fail: Self::default_rollback(),
            context_lines: Self::default_context_lines(),
        }
    }
}

/// Raw deserialized file shape.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SettingsFile {
    #[serde(default)]
    pub runs: RunsSection,
    #[serde(default)]
    pub verify: VerifySection,
}

/// Effective settings handed to the run engine.
#[derive(Debug, Clone)]
pub struct Settings {
    pub runs_dirname: String,
    pub keep_runs: usize,
    pub rollback_on_compile_fail: bool,
    pub context_lines: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runs_dirname: RUNS_DIRNAME.to_string(),
            keep_runs: KEEP_RUNS,
            rollback_on_compile_fail: ROLLBACK_ON_COMPILE_FAIL,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

impl From<SettingsFile> for Settings {
    fn from(file: SettingsFile) -> Self {
        Self {
            runs_dirname: file.runs.dirname,
            // A run must survive its own prune pass.
            keep_runs: file.runs.keep.max(1),
            rollback_on_compile_fail: file.verify.rollback_on_compile_fail,
            context_lines: file.verify.context_lines.max(1),
        }
    }
}

/// Load settings for a project root. Missing or malformed files yield the
/// defaults.
pub fn load_from(root: &Path) -> Settings {
    let path = root.join(CONFIG_FILE_NAME);
    let Ok(content) = fs::read_to_string(&path) else {
        debug!(target: "config", path = %path.display(), "config_absent_using_defaults");
        return Settings::default();
    };
    match toml::from_str::<SettingsFile>(&content) {
        Ok(file) => {
            debug!(target: "config", path = %path.display(), "config_loaded");
            file.into()
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_from(dir.path());
        assert_eq!(s.runs_dirname, "patch_runs");
        assert_eq!(s.keep_runs, 5);
        assert!(s.rollback_on_compile_fail);
        assert_eq!(s.context_lines, 25);
    }

    #[test]
    fn parses_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[runs]\ndirname = \"history\"\nkeep = 2\n[verify]\nrollback_on_compile_fail = false\n",
        )
        .unwrap();
        let s = load_from(dir.path());
        assert_eq!(s.runs_dirname, "history");
        assert_eq!(s.keep_runs, 2);
        assert!(!s.rollback_on_compile_fail);
        assert_eq!(s.context_lines, 25);
    }

    #[test]
    fn keep_zero_clamps_to_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[runs]\nkeep = 0\n").unwrap();
        assert_eq!(load_from(dir.path()).keep_runs, 1);
    }

    #[test]
    fn unknown_fields_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[future]\nshiny = true\n[runs]\nkeep = 3\n",
        )
        .unwrap();
        assert_eq!(load_from(dir.path()).keep_runs, 3);
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "not toml [[[").unwrap();
        assert_eq!(load_from(dir.path()).keep_runs, 5);
    }
}
