//! Pipeline driver: parse the bundle, run each op against the cache, verify
//! every touched file on disk, persist the run, prune old ones.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use core_bundle::Operation;
use core_config::Settings;
use core_edit::{ApplyContext, OpStatus, apply_operation};
use tracing::{info, warn};

use crate::cache::FileCache;
use crate::hash::sha256_hex;
use crate::manifest::{Manifest, OpResult, TouchedFile, render_packet, render_summary};
use crate::{RunError, stamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Apply,
    /// Full pipeline, no disk effects: no writes, snapshots, persistence, or
    /// pruning. Verification runs against the in-memory buffers.
    DryRun,
}

#[derive(Debug)]
pub struct RunReport {
    pub stamp: String,
    pub root: PathBuf,
    pub mode: RunMode,
    /// Present only for real runs.
    pub run_dir: Option<PathBuf>,
    pub results: Vec<OpResult>,
    pub touched: Vec<TouchedFile>,
    pub summary: String,
    pub packet: String,
    /// `LIST_TARGETS` payload destined for the clipboard.
    pub targets: Option<String>,
}

/// Execute a bundle under `root`. `default_file` backs bare targets when the
/// bundle never set a `DEFAULT_FILE`.
pub fn execute(
    root: &Path,
    settings: &Settings,
    bundle_text: &str,
    mode: RunMode,
    default_file: Option<&str>,
) -> Result<RunReport, RunError> {
    core_locate::ensure_frontend().map_err(RunError::Frontend)?;
    let root = fs::canonicalize(root)
        .map_err(|e| RunError::io(format!("cannot resolve root {}", root.display()), e))?;
    let ops = core_bundle::parse_bundle(bundle_text)?;
    let runs_root = root.join(&settings.runs_dirname);
    let stamp = stamp::unique_stamp(&runs_root);
    info!(
        target: "run",
        stamp = %stamp,
        root = %root.display(),
        ops = ops.len(),
        dry = matches!(mode, RunMode::DryRun),
        "run_started"
    );

    let mut cache = FileCache::new(root.clone());
    let ctx = ApplyContext {
        context_lines: settings.context_lines,
    };
    let mut results = Vec::with_capacity(ops.len());
    let mut target_lists: Vec<String> = Vec::new();

    for op in &ops {
        results.push(run_one(op, &mut cache, &ctx, default_file, &mut target_lists));
    }

    let mut touched = Vec::new();
    for entry in cache.entries_mut().filter(|e| e.touched) {
        let after_text = entry.buffer.text();
        let (compile_ok, compile_error) = match mode {
            RunMode::DryRun => verify_text(&after_text),
            RunMode::Apply => write_and_verify(
                &entry.canonical,
                &after_text,
                &entry.before,
                settings.rollback_on_compile_fail,
            ),
        };
        if !compile_ok {
            warn!(
                target: "run",
                file = %entry.rel.display(),
                error = compile_error.as_deref().unwrap_or(""),
                "verify_failed"
            );
        }
        touched.push(TouchedFile {
            rel: entry.rel.to_string_lossy().into_owned(),
            snapshot_rel: format!("snapshots/{}", entry.rel.to_string_lossy()),
            before_sha: sha256_hex(&entry.before),
            after_sha: sha256_hex(&after_text),
            compile_ok,
            compile_error,
        });
    }

    demote_failed_compiles(&mut results, &touched);

    let summary = render_summary(&stamp, &root.to_string_lossy(), &results);
    let run_dir = match mode {
        RunMode::DryRun => None,
        RunMode::Apply => Some(persist(
            &runs_root,
            &stamp,
            &root,
            bundle_text,
            &cache,
            &touched,
            &results,
            &summary,
        )?),
    };
    if matches!(mode, RunMode::Apply) {
        prune_runs(&runs_root, settings.keep_runs);
    }

    let summary_path = run_dir
        .as_ref()
        .map(|d| d.join("logs").join("run_summary.txt"));
    let packet = render_packet(
        &stamp,
        run_dir.as_deref().map(|d| d.to_string_lossy()).as_deref(),
        summary_path
            .as_deref()
            .map(|d| d.to_string_lossy())
            .as_deref(),
        &results,
    );
    let targets = if target_lists.is_empty() {
        None
    } else {
        Some(target_lists.join("\n\n"))
    };
    info!(target: "run", stamp = %stamp, "run_finished");

    Ok(RunReport {
        stamp,
        root,
        mode,
        run_dir,
        results,
        touched,
        summary,
        packet,
        targets,
    })
}

fn run_one(
    op: &Operation,
    cache: &mut FileCache,
    ctx: &ApplyContext,
    default_file: Option<&str>,
    target_lists: &mut Vec<String>,
) -> OpResult {
    let mut result = OpResult::new(op.kind(), op.target_display());
    let file_ref = op
        .file_ref()
        .map(str::to_string)
        .or_else(|| default_file.map(str::to_string));
    let Some(file_ref) = file_ref else {
        result.status = OpStatus::FailedParse;
        result.message = "no target file: no explicit file, DEFAULT_FILE, or current file".into();
        return result;
    };
    let entry = match cache.entry(&file_ref) {
        Ok(entry) => entry,
        Err(e) => {
            result.status = e.status();
            result.message = e.message();
            return result;
        }
    };
    result.file = Some(entry.rel.to_string_lossy().into_owned());

    if matches!(op, Operation::ListTargets { .. }) {
        match core_locate::list_targets(&entry.buffer.text()) {
            Ok(list) => {
                result.status = OpStatus::Applied;
                result.message = format!("{} target(s) listed", list.len());
                target_lists.push(list.join("\n"));
            }
            Err(e) => {
                result.status = OpStatus::FailedParse;
                result.message = format!("LocateError: {e}");
            }
        }
        return result;
    }

    let pre = entry.buffer.clone();
    let outcome = apply_operation(op, &mut entry.buffer, ctx);
    result.status = outcome.status;
    result.range = outcome.range;
    result.message = outcome.message;
    if let Some((s, e)) = outcome.range {
        result.hash_before = Some(sha256_hex(&pre.slice_text(s, e)));
    }
    result.hash_after = Some(sha256_hex(&entry.buffer.text()));
    if outcome.status.is_applied() {
        entry.touched = true;
    }
    info!(
        target: "run",
        kind = %result.kind,
        op_target = %result.target,
        status = result.status.as_str(),
        "op_finished"
    );
    result
}

fn verify_text(text: &str) -> (bool, Option<String>) {
    match core_locate::check_syntax(text) {
        Ok(None) => (true, None),
        Ok(Some(issue)) => (false, Some(issue.to_string())),
        Err(e) => (false, Some(format!("front-end failure: {e}"))),
    }
}

/// Write, re-read, hash-compare, then compile-check the re-read text. Any
/// failure restores the pre-run content when rollback is enabled.
fn write_and_verify(
    path: &Path,
    new_text: &str,
    before: &str,
    rollback: bool,
) -> (bool, Option<String>) {
    if let Err(e) = fs::write(path, new_text) {
        return fail_rollback(path, before, rollback, format!("write failed: {e}"));
    }
    let reread = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => return fail_rollback(path, before, rollback, format!("re-read failed: {e}")),
    };
    if sha256_hex(&reread) != sha256_hex(new_text) {
        return fail_rollback(
            path,
            before,
            rollback,
            "WRITEBACK_MISMATCH: on-disk content differs from the intended write".into(),
        );
    }
    let (ok, error) = verify_text(&reread);
    if !ok {
        return fail_rollback(
            path,
            before,
            rollback,
            error.unwrap_or_else(|| "compile failed".into()),
        );
    }
    (true, None)
}

fn fail_rollback(path: &Path, before: &str, rollback: bool, message: String) -> (bool, Option<String>) {
    if rollback {
        if let Err(e) = fs::write(path, before) {
            warn!(target: "run", path = %path.display(), error = %e, "rollback_failed");
        } else {
            info!(target: "run", path = %path.display(), "rolled_back");
        }
    }
    (false, Some(message))
}

/// Demote `APPLIED` ops whose file failed verification, attaching the
/// compile error when the record carries no message of its own.
fn demote_failed_compiles(results: &mut [OpResult], touched: &[TouchedFile]) {
    let failures: HashMap<&str, &str> = touched
        .iter()
        .filter(|t| !t.compile_ok)
        .map(|t| {
            (
                t.rel.as_str(),
                t.compile_error.as_deref().unwrap_or("compile failed"),
            )
        })
        .collect();
    for result in results.iter_mut() {
        let Some(file) = result.file.clone() else {
            continue;
        };
        if let Some(error) = failures.get(file.as_str()) {
            if result.status.is_applied() {
                result.status = OpStatus::FailedCompile;
                if result.message.is_empty() {
                    result.message = (*error).to_string();
                }
            }
            result.compile_ok = Some(false);
        } else if touched.iter().any(|t| t.rel == file) {
            result.compile_ok = Some(true);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn persist(
    runs_root: &Path,
    stamp: &str,
    root: &Path,
    bundle_text: &str,
    cache: &FileCache,
    touched: &[TouchedFile],
    results: &[OpResult],
    summary: &str,
) -> Result<PathBuf, RunError> {
    let run_dir = runs_root.join(stamp);
    let logs_dir = run_dir.join("logs");
    fs::create_dir_all(&logs_dir)
        .map_err(|e| RunError::io(format!("create {}", logs_dir.display()), e))?;
    fs::write(run_dir.join("bundle.txt"), bundle_text)
        .map_err(|e| RunError::io("write bundle.txt".to_string(), e))?;

    for entry in cache.entries().filter(|e| e.touched) {
        let snap = run_dir.join("snapshots").join(&entry.rel);
        if let Some(parent) = snap.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RunError::io(format!("create {}", parent.display()), e))?;
        }
        fs::write(&snap, &entry.before)
            .map_err(|e| RunError::io(format!("write snapshot {}", snap.display()), e))?;
    }

    let manifest = Manifest {
        stamp: stamp.to_string(),
        root: root.to_string_lossy().into_owned(),
        bundle_sha: sha256_hex(bundle_text),
        touched: touched.to_vec(),
        results: results.to_vec(),
    };
    let json = serde_json::to_string_pretty(&manifest).map_err(|e| RunError::Manifest {
        stamp: stamp.to_string(),
        detail: e.to_string(),
    })?;
    fs::write(run_dir.join("manifest.json"), json)
        .map_err(|e| RunError::io("write manifest.json".to_string(), e))?;

    fs::write(logs_dir.join("run_summary.txt"), summary)
        .map_err(|e| RunError::io("write run_summary.txt".to_string(), e))?;
    let mut jsonl = String::new();
    for result in results {
        let line = serde_json::to_string(result).map_err(|e| RunError::Manifest {
            stamp: stamp.to_string(),
            detail: e.to_string(),
        })?;
        jsonl.push_str(&line);
        jsonl.push('\n');
    }
    fs::write(logs_dir.join("run_log.jsonl"), jsonl)
        .map_err(|e| RunError::io("write run_log.jsonl".to_string(), e))?;

    info!(target: "run", dir = %run_dir.display(), "run_persisted");
    Ok(run_dir)
}

/// Keep the newest `keep` run directories; best-effort removal of the rest.
fn prune_runs(runs_root: &Path, keep: usize) {
    let Ok(read) = fs::read_dir(runs_root) else {
        return;
    };
    let mut stamps: Vec<String> = read
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| stamp::is_stamp_like(name))
        .collect();
    stamps.sort();
    if stamps.len() <= keep {
        return;
    }
    let excess = stamps.len() - keep;
    for name in &stamps[..excess] {
        let dir = runs_root.join(name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => info!(target: "run", run = name.as_str(), "run_pruned"),
            Err(e) => warn!(target: "run", run = name.as_str(), error = %e, "prune_failed"),
        }
    }
}
