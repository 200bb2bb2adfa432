//! Orchestrator: resolves the run context (root, current file), performs the
//! preflight safety checks, drives the engine, and reports back through the
//! host surfaces.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use core_host::{Clipboard, ConsoleHost, Host, SystemClipboard, packet_sink};
use core_run::{RunMode, RunReport};

/// Project root: explicit override, else the current file's directory, else
/// the working directory.
fn resolve_root(cli_root: Option<&Path>, host: &dyn Host) -> Result<PathBuf> {
    if let Some(root) = cli_root {
        return fs::canonicalize(root)
            .with_context(|| format!("cannot resolve root {}", root.display()));
    }
    if let Some(current) = host.current_file()
        && let Ok(canonical) = fs::canonicalize(&current)
        && let Some(parent) = canonical.parent()
    {
        return Ok(parent.to_path_buf());
    }
    std::env::current_dir().context("cannot determine working directory")
}

fn make_host(file: Option<&Path>) -> ConsoleHost {
    ConsoleHost::new(file.map(Path::to_path_buf))
}

/// Refuse the run when an op targets the currently open file and the editor
/// buffer differs from disk. Hosts without buffer access skip the check.
fn preflight_dirty_check(
    host: &dyn Host,
    root: &Path,
    bundle: &str,
    default_file: Option<&str>,
) -> Result<()> {
    let Some(current) = host.current_file() else {
        return Ok(());
    };
    let Some(buffer) = host.buffer_text() else {
        return Ok(());
    };
    let Ok(current_canonical) = fs::canonicalize(&current) else {
        return Ok(());
    };
    // A malformed bundle is the engine's error to report, not preflight's.
    let Ok(ops) = core_bundle::parse_bundle(bundle) else {
        return Ok(());
    };
    let targets_current = ops.iter().any(|op| {
        let file_ref = op.file_ref().or(default_file);
        file_ref.is_some_and(|f| {
            let path = if Path::new(f).is_absolute() {
                PathBuf::from(f)
            } else {
                root.join(f)
            };
            fs::canonicalize(path).is_ok_and(|c| c == current_canonical)
        })
    });
    if targets_current {
        let disk = fs::read_to_string(&current_canonical).unwrap_or_default();
        if disk != buffer {
            host.alert(
                "patchpilot",
                "The current file has unsaved changes. Save it, then apply again.",
                &["OK"],
            );
            bail!("refused: unsaved changes in {}", current.display());
        }
    }
    Ok(())
}

fn read_bundle(bundle: Option<&Path>, clipboard: bool) -> Result<String> {
    if clipboard {
        // No clipboard means no bundle: fatal for Apply, per the host
        // contract.
        let mut source = SystemClipboard::new()?;
        return Ok(source.read_text()?);
    }
    match bundle {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path)
            .with_context(|| format!("cannot read bundle {}", path.display())),
        _ => {
            let mut stdin = core_host::StdioClipboard;
            Ok(stdin.read_text()?)
        }
    }
}

pub fn run_apply(
    cli_root: Option<&Path>,
    file: Option<&Path>,
    bundle: Option<&Path>,
    clipboard: bool,
    dry_run: bool,
) -> Result<()> {
    let host = make_host(file);
    let root = resolve_root(cli_root, &host)?;
    let settings = core_config::load_from(&root);
    let bundle_text = read_bundle(bundle, clipboard)?;

    let default_file = host
        .current_file()
        .map(|p| p.to_string_lossy().into_owned());
    preflight_dirty_check(&host, &root, &bundle_text, default_file.as_deref())?;

    let mode = if dry_run { RunMode::DryRun } else { RunMode::Apply };
    let report = core_run::execute(&root, &settings, &bundle_text, mode, default_file.as_deref())?;
    deliver(&host, &report)?;

    let (_, _, failed) = core_run::totals(&report.results);
    if failed > 0 {
        bail!("{failed} operation(s) failed; see {} for details", report.stamp);
    }
    Ok(())
}

/// Print the summary, toast the totals, and copy the packet (and any
/// `LIST_TARGETS` payload) to the clipboard for real runs.
fn deliver(host: &dyn Host, report: &RunReport) -> Result<()> {
    print!("{}", report.summary);
    let (applied, skipped, failed) = core_run::totals(&report.results);
    host.toast(&format!(
        "patchpilot: applied={applied} skipped={skipped} failed={failed}"
    ));
    if matches!(report.mode, RunMode::Apply) {
        let mut sink = packet_sink();
        let mut payload = report.packet.clone();
        if let Some(targets) = &report.targets {
            payload.push('\n');
            payload.push_str(targets);
            payload.push('\n');
        }
        if let Err(e) = sink.write_text(&payload) {
            warn!(target: "host", error = %e, "packet_delivery_failed");
        }
    }
    Ok(())
}

pub fn run_revert(
    cli_root: Option<&Path>,
    file: Option<&Path>,
    stamp: Option<String>,
    latest: bool,
) -> Result<()> {
    let host = make_host(file);
    let root = resolve_root(cli_root, &host)?;
    let settings = core_config::load_from(&root);
    let runs = core_run::list_runs(&root, &settings);
    if runs.is_empty() {
        bail!("no runs recorded under {}", root.display());
    }

    let stamp = if let Some(stamp) = stamp {
        stamp
    } else if latest {
        runs[0].clone()
    } else if runs.len() == 1 {
        let choice = host.alert(
            "patchpilot",
            &format!("Revert run {}?", runs[0]),
            &["Revert", "Cancel"],
        );
        if choice != 1 {
            info!(target: "runtime", "revert_cancelled");
            return Ok(());
        }
        runs[0].clone()
    } else {
        match host.pick("Revert which run?", &runs) {
            Some(idx) => runs[idx].clone(),
            None => {
                bail!("multiple runs recorded; pass a stamp or --latest");
            }
        }
    };

    let outcome = core_run::revert_run(&root, &settings, &stamp)?;
    host.toast(&outcome.describe());
    if outcome.failed > 0 {
        bail!("revert completed with {} failure(s)", outcome.failed);
    }
    Ok(())
}

pub fn run_list(cli_root: Option<&Path>, file: Option<&Path>) -> Result<()> {
    let host = make_host(file);
    let root = resolve_root(cli_root, &host)?;
    let settings = core_config::load_from(&root);
    let runs = core_run::list_runs(&root, &settings);
    if runs.is_empty() {
        println!("no runs recorded under {}", root.display());
        return Ok(());
    }
    for stamp in runs {
        println!("{stamp}");
    }
    Ok(())
}

pub fn run_targets(file: &Path) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let targets = core_locate::list_targets(&text)?;
    let listing = targets.join("\n");
    println!("{listing}");
    let mut sink = packet_sink();
    if let Err(e) = sink.write_text(&listing) {
        warn!(target: "host", error = %e, "targets_delivery_failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_prefers_cli_override() {
        let dir = tempfile::tempdir().unwrap();
        let host = make_host(None);
        let root = resolve_root(Some(dir.path()), &host).unwrap();
        assert_eq!(root, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn root_falls_back_to_current_file_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mod.py");
        fs::write(&file, "x = 1\n").unwrap();
        let host = make_host(Some(&file));
        let root = resolve_root(None, &host).unwrap();
        assert_eq!(root, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn bundle_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.txt");
        fs::write(&path, "LIST_TARGETS a.py\n").unwrap();
        assert_eq!(
            read_bundle(Some(&path), false).unwrap(),
            "LIST_TARGETS a.py\n"
        );
    }

    #[test]
    fn preflight_skips_hosts_without_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "x = 1\n").unwrap();
        let host = make_host(Some(&file));
        // ConsoleHost exposes no buffer, so even a targeting bundle passes.
        preflight_dirty_check(
            &host,
            dir.path(),
            "REPLACE a.py::f\n    pass\n",
            None,
        )
        .unwrap();
    }
}
