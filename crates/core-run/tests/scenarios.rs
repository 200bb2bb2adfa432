//! End-to-end runs against a temporary project tree: apply, verify,
//! rollback, persist, prune, revert.

use std::fs;
use std::path::{Path, PathBuf};

use core_config::Settings;
use core_edit::OpStatus;
use core_run::{RunMode, RunReport, execute, list_runs, revert_run, sha256_hex};

const CLASS_AB: &str = "\
class C:
    def a(self):
        return 1
    def b(self):
        return 2
";

fn project() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    (dir, root)
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

fn apply(root: &Path, bundle: &str) -> RunReport {
    execute(root, &Settings::default(), bundle, RunMode::Apply, None).unwrap()
}

#[test]
fn replace_method_leaves_sibling_untouched() {
    let (_guard, root) = project();
    write(&root, "a.py", CLASS_AB);
    let report = apply(&root, "REPLACE a.py::C.a\n    def a(self):\n        return 10\n");

    assert_eq!(report.results[0].status, OpStatus::Applied);
    assert_eq!(report.results[0].compile_ok, Some(true));
    assert_eq!(
        read(&root, "a.py"),
        "class C:\n    def a(self):\n        return 10\n    def b(self):\n        return 2\n"
    );
    // hash_after matches the file as verified on disk.
    assert_eq!(
        report.results[0].hash_after.as_deref(),
        Some(sha256_hex(&read(&root, "a.py")).as_str())
    );
}

#[test]
fn insert_after_then_identical_rerun_is_idempotent() {
    let (_guard, root) = project();
    write(&root, "a.py", "class C:\n    def a(self):\n        return 1\n");
    let bundle = "INSERT_AFTER a.py::C.a\n    def c(self):\n        return 3\n";

    let first = apply(&root, bundle);
    assert_eq!(first.results[0].status, OpStatus::Applied);
    let after_first = read(&root, "a.py");
    assert!(after_first.contains("def c(self):"));

    let second = apply(&root, bundle);
    assert_eq!(second.results[0].status, OpStatus::SkippedAlreadyPresent);
    assert_eq!(read(&root, "a.py"), after_first);
    assert!(second.touched.is_empty(), "skip must not touch the file");
}

#[test]
fn full_bundle_applied_twice_reaches_a_fixpoint() {
    let (_guard, root) = project();
    write(&root, "a.py", CLASS_AB);
    write(&root, "b.py", "def fn():\n    total = 0\n    return total\n");
    let bundle = "\
REPLACE a.py::C.a
    def a(self):
        return 10
INSERT_AFTER a.py::C.b
    def d(self):
        return 4
REPLACE_LINE b.py::fn
ANCHOR: total = 0
total = 99
";
    let first = apply(&root, bundle);
    assert!(first.results.iter().all(|r| r.status.is_applied()));
    let a_after = read(&root, "a.py");
    let b_after = read(&root, "b.py");

    let second = apply(&root, bundle);
    assert_eq!(
        second.results.iter().filter(|r| r.status.is_applied()).count(),
        0,
        "second run must apply nothing: {:?}",
        second.results
    );
    assert_eq!(read(&root, "a.py"), a_after);
    assert_eq!(read(&root, "b.py"), b_after);
}

#[test]
fn later_ops_observe_earlier_edits_in_same_run() {
    let (_guard, root) = project();
    write(&root, "a.py", "class C:\n    def a(self):\n        return 1\n");
    let bundle = "\
REPLACE a.py::C.a
    def a(self):
        return 10
INSERT_AFTER a.py::C.a
    def c(self):
        return 3
";
    let report = apply(&root, bundle);
    assert!(report.results.iter().all(|r| r.status.is_applied()));
    let text = read(&root, "a.py");
    assert!(text.contains("return 10"));
    assert!(text.contains("def c(self):"));
    // One touched file, snapshotted at its pre-run content.
    assert_eq!(report.touched.len(), 1);
    let snap = report.run_dir.unwrap().join("snapshots").join("a.py");
    assert_eq!(
        fs::read_to_string(snap).unwrap(),
        "class C:\n    def a(self):\n        return 1\n"
    );
}

#[test]
fn compile_failure_rolls_back_and_demotes() {
    let (_guard, root) = project();
    write(&root, "a.py", CLASS_AB);
    write(&root, "b.py", "def ok():\n    return 1\n");
    let bundle = "\
REPLACE a.py::C.a
    def a(self:
        return 10
REPLACE b.py::ok
    def ok():
        return 2
";
    let report = apply(&root, bundle);

    assert_eq!(report.results[0].status, OpStatus::FailedCompile);
    assert_eq!(report.results[0].compile_ok, Some(false));
    // Rollback: disk content is byte-identical to the pre-run state.
    assert_eq!(read(&root, "a.py"), CLASS_AB);
    // The failure does not stop later ops on other files.
    assert_eq!(report.results[1].status, OpStatus::Applied);
    assert_eq!(read(&root, "b.py"), "def ok():\n    return 2\n");

    let touched_a = report.touched.iter().find(|t| t.rel == "a.py").unwrap();
    assert!(!touched_a.compile_ok);
    assert!(touched_a.compile_error.is_some());
}

#[test]
fn revert_restores_every_touched_file() {
    let (_guard, root) = project();
    write(&root, "a.py", CLASS_AB);
    write(&root, "pkg/b.py", "def fn():\n    return 1\n");
    let before_a = read(&root, "a.py");
    let before_b = read(&root, "pkg/b.py");

    let bundle = "\
REPLACE a.py::C.a
    def a(self):
        return 10
REPLACE a.py::ghost
    pass
REPLACE pkg/b.py::fn
    def fn():
        return 2
";
    let report = apply(&root, bundle);
    assert_eq!(report.results[1].status, OpStatus::FailedNotFound);
    assert_ne!(read(&root, "a.py"), before_a);
    assert_ne!(read(&root, "pkg/b.py"), before_b);

    let outcome = revert_run(&root, &Settings::default(), &report.stamp).unwrap();
    assert_eq!(outcome.restored, 2);
    assert_eq!(outcome.failed, 0);
    assert_eq!(read(&root, "a.py"), before_a);
    assert_eq!(read(&root, "pkg/b.py"), before_b);

    // Byte-exact per the manifest hashes.
    for touched in &report.touched {
        assert_eq!(sha256_hex(&read(&root, &touched.rel)), touched.before_sha);
    }
}

#[test]
fn dry_run_leaves_disk_and_history_alone() {
    let (_guard, root) = project();
    write(&root, "a.py", CLASS_AB);
    let report = execute(
        &root,
        &Settings::default(),
        "REPLACE a.py::C.a\n    def a(self):\n        return 10\n",
        RunMode::DryRun,
        None,
    )
    .unwrap();
    assert_eq!(report.results[0].status, OpStatus::Applied);
    assert_eq!(report.results[0].compile_ok, Some(true));
    assert!(report.run_dir.is_none());
    assert_eq!(read(&root, "a.py"), CLASS_AB);
    assert!(!root.join("patch_runs").exists());
}

#[test]
fn pruning_keeps_newest_runs_only() {
    let (_guard, root) = project();
    write(&root, "a.py", "x = 1\n\ndef f():\n    return x\n");
    let settings = Settings {
        keep_runs: 2,
        ..Settings::default()
    };
    for value in ["2", "3", "4"] {
        let bundle = format!("REPLACE_LINE a.py::f\nANCHOR: return\nreturn x + {value}\n");
        execute(&root, &settings, &bundle, RunMode::Apply, None).unwrap();
    }
    let runs = list_runs(&root, &settings);
    assert_eq!(runs.len(), 2, "retained runs: {runs:?}");
    // Newest first.
    assert!(runs[0] >= runs[1]);
}

#[test]
fn path_escape_is_refused_without_reading() {
    let (_guard, outer) = project();
    let root = outer.join("proj");
    fs::create_dir_all(&root).unwrap();
    write(&outer, "secret.py", "def f():\n    pass\n");
    let report = execute(
        &root,
        &Settings::default(),
        "REPLACE ../secret.py::f\n    pass\n",
        RunMode::Apply,
        None,
    )
    .unwrap();
    assert_eq!(report.results[0].status, OpStatus::FailedInvalidPath);
    assert_eq!(read(&outer, "secret.py"), "def f():\n    pass\n");
}

#[test]
fn default_file_parameter_backs_bare_targets() {
    let (_guard, root) = project();
    write(&root, "cur.py", "def f():\n    return 1\n");
    let report = execute(
        &root,
        &Settings::default(),
        "REPLACE f\n    def f():\n        return 2\n",
        RunMode::Apply,
        Some("cur.py"),
    )
    .unwrap();
    assert_eq!(report.results[0].status, OpStatus::Applied);
    assert_eq!(read(&root, "cur.py"), "def f():\n    return 2\n");
}

#[test]
fn list_targets_reports_without_touching() {
    let (_guard, root) = project();
    write(&root, "a.py", CLASS_AB);
    let report = apply(&root, "LIST_TARGETS a.py");
    assert_eq!(report.results[0].status, OpStatus::Applied);
    let targets = report.targets.expect("targets payload");
    assert!(targets.contains("C.*"));
    assert!(targets.contains("C.a"));
    assert!(report.touched.is_empty());
    assert_eq!(read(&root, "a.py"), CLASS_AB);
}

#[test]
fn run_directory_layout_matches_contract() {
    let (_guard, root) = project();
    write(&root, "a.py", CLASS_AB);
    let report = apply(&root, "REPLACE a.py::C.a\n    def a(self):\n        return 10\n");
    let run_dir = report.run_dir.unwrap();

    assert!(run_dir.join("bundle.txt").is_file());
    assert!(run_dir.join("manifest.json").is_file());
    assert!(run_dir.join("snapshots").join("a.py").is_file());
    assert!(run_dir.join("logs").join("run_summary.txt").is_file());
    assert!(run_dir.join("logs").join("run_log.jsonl").is_file());

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(run_dir.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["stamp"], report.stamp.as_str());
    assert_eq!(manifest["touched"][0]["rel"], "a.py");
    assert_eq!(manifest["results"][0]["status"], "APPLIED");

    let jsonl = fs::read_to_string(run_dir.join("logs").join("run_log.jsonl")).unwrap();
    assert_eq!(jsonl.lines().count(), 1);
    assert!(report.packet.contains("totals: applied=1 skipped=0 failed=0"));
}

#[test]
fn revert_of_unknown_stamp_errors() {
    let (_guard, root) = project();
    let err = revert_run(&root, &Settings::default(), "19990101_000000").unwrap_err();
    assert!(matches!(err, core_run::RunError::RunNotFound { .. }));
}
