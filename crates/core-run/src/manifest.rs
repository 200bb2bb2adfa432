//! Persistent run records: manifest types plus the human summary and the
//! clipboard run packet.

use serde::{Deserialize, Serialize};

use core_edit::OpStatus;

/// Outcome of one operation, one line of `run_log.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpResult {
    pub kind: String,
    pub target: String,
    /// Touched file, relative to the run root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Resolved inclusive line range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(usize, usize)>,
    pub status: OpStatus,
    /// Hash of the located region before the edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_before: Option<String>,
    /// Hash of the whole file after the edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_ok: Option<bool>,
    pub message: String,
}

impl OpResult {
    pub fn new(kind: &str, target: String) -> Self {
        Self {
            kind: kind.to_string(),
            target,
            file: None,
            range: None,
            status: OpStatus::FailedParse,
            hash_before: None,
            hash_after: None,
            compile_ok: None,
            message: String::new(),
        }
    }
}

/// Per-file verification record in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouchedFile {
    pub rel: String,
    pub snapshot_rel: String,
    pub before_sha: String,
    pub after_sha: String,
    pub compile_ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub stamp: String,
    pub root: String,
    pub bundle_sha: String,
    pub touched: Vec<TouchedFile>,
    pub results: Vec<OpResult>,
}

fn result_line(r: &OpResult) -> String {
    let mut line = format!("[{}] {} {}", r.status, r.kind, r.target);
    if let Some(file) = &r.file {
        match r.range {
            Some((s, e)) => line.push_str(&format!(" ({file}:{s}-{e})")),
            None => line.push_str(&format!(" ({file})")),
        }
    }
    if !r.message.is_empty() {
        line.push_str(": ");
        line.push_str(&r.message);
    }
    line
}

pub fn totals(results: &[OpResult]) -> (usize, usize, usize) {
    let applied = results.iter().filter(|r| r.status.is_applied()).count();
    let failed = results.iter().filter(|r| r.status.is_failed()).count();
    let skipped = results.len() - applied - failed;
    (applied, skipped, failed)
}

/// Human log written to `logs/run_summary.txt` and shown by the host.
pub fn render_summary(stamp: &str, root: &str, results: &[OpResult]) -> String {
    let (applied, skipped, failed) = totals(results);
    let mut out = format!("run {stamp}\nroot: {root}\n");
    for r in results {
        out.push_str(&result_line(r));
        out.push('\n');
    }
    out.push_str(&format!(
        "totals: applied={applied} skipped={skipped} failed={failed}\n"
    ));
    out
}

/// Compact multi-line packet placed on the clipboard after every real run.
pub fn render_packet(
    stamp: &str,
    run_dir: Option<&str>,
    summary_path: Option<&str>,
    results: &[OpResult],
) -> String {
    let (applied, skipped, failed) = totals(results);
    let mut out = format!("patchpilot run {stamp}\n");
    out.push_str(&format!("run dir: {}\n", run_dir.unwrap_or("-")));
    out.push_str(&format!("summary: {}\n", summary_path.unwrap_or("-")));
    out.push_str(&format!(
        "totals: applied={applied} skipped={skipped} failed={failed}\n"
    ));
    for r in results {
        out.push_str(&result_line(r));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(status: OpStatus) -> OpResult {
        OpResult {
            kind: "REPLACE".into(),
            target: "a.py::C.a".into(),
            file: Some("a.py".into()),
            range: Some((2, 3)),
            status,
            hash_before: Some("aa".into()),
            hash_after: Some("bb".into()),
            compile_ok: Some(true),
            message: "replaced lines 2-3".into(),
        }
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let manifest = Manifest {
            stamp: "20260801_120000".into(),
            root: "/tmp/proj".into(),
            bundle_sha: "00".into(),
            touched: vec![TouchedFile {
                rel: "a.py".into(),
                snapshot_rel: "snapshots/a.py".into(),
                before_sha: "aa".into(),
                after_sha: "bb".into(),
                compile_ok: true,
                compile_error: None,
            }],
            results: vec![sample_result(OpStatus::Applied)],
        };
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        assert!(json.contains("\"APPLIED\""));
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.results[0].status, OpStatus::Applied);
        assert_eq!(back.touched[0].rel, "a.py");
    }

    #[test]
    fn summary_counts_statuses() {
        let results = vec![
            sample_result(OpStatus::Applied),
            sample_result(OpStatus::SkippedAlreadyPresent),
            sample_result(OpStatus::FailedNotFound),
        ];
        let summary = render_summary("s", "/r", &results);
        assert!(summary.contains("totals: applied=1 skipped=1 failed=1"));
        assert!(summary.contains("[APPLIED] REPLACE a.py::C.a (a.py:2-3)"));
    }

    #[test]
    fn packet_mentions_run_dir() {
        let packet = render_packet("s", Some("/r/patch_runs/s"), None, &[]);
        assert!(packet.contains("run dir: /r/patch_runs/s"));
        assert!(packet.contains("summary: -"));
    }
}
