//! Run stamps: `YYYYMMDD_HHMMSS`, unique per invocation.
//!
//! Stamps sort lexicographically in chronological order, which is what lets
//! pruning and the revert picker work off a plain directory sort.

use chrono::Local;
use std::path::Path;

pub fn new_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// A stamp no existing run directory uses. Collisions within one second get
/// a numeric suffix, which still sorts after the bare stamp.
pub fn unique_stamp(runs_root: &Path) -> String {
    let base = new_stamp();
    if !runs_root.join(&base).exists() {
        return base;
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{base}_{n}");
        if !runs_root.join(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Directory names that look like run stamps, so pruning never deletes
/// foreign directories that ended up under the runs dir.
pub fn is_stamp_like(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 15
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[8] == b'_'
        && bytes[9..15].iter().all(u8::is_ascii_digit)
}
