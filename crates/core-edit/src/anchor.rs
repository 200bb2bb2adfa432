//! Anchor line resolution inside a located block.

use core_bundle::MatchMode;

use crate::buffer::SourceBuffer;

/// Collapse runs of whitespace to a single space. Deliberately does not trim:
/// a leading indent run becomes one leading space on both sides of the
/// comparison, so fuzzy matching stays containment-based.
pub fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}

/// Absolute line numbers within `[start, end]` containing the anchor.
pub fn anchor_lines(
    buf: &SourceBuffer,
    start: usize,
    end: usize,
    anchor: &str,
    mode: MatchMode,
) -> Vec<usize> {
    let needle = match mode {
        MatchMode::Exact => anchor.to_string(),
        MatchMode::Fuzzy => collapse_ws(anchor),
    };
    let mut hits = Vec::new();
    for n in start..=end.min(buf.line_count()) {
        let Some(line) = buf.line(n) else { continue };
        let haystack = match mode {
            MatchMode::Exact => line.to_string(),
            MatchMode::Fuzzy => collapse_ws(line),
        };
        if haystack.contains(&needle) {
            hits.push(n);
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_preserves_leading_marker() {
        assert_eq!(collapse_ws("    if  x:\t# c"), " if x: # c");
    }

    #[test]
    fn exact_match_is_substring_containment() {
        let buf = SourceBuffer::from_text("def f():\n    if x:\n        y = 1\n");
        assert_eq!(anchor_lines(&buf, 1, 3, "if x:", MatchMode::Exact), vec![2]);
    }

    #[test]
    fn exact_match_sensitive_to_spacing() {
        let buf = SourceBuffer::from_text("def f():\n    if  x:\n");
        assert!(anchor_lines(&buf, 1, 2, "if x:", MatchMode::Exact).is_empty());
        assert_eq!(
            anchor_lines(&buf, 1, 2, "if x:", MatchMode::Fuzzy),
            vec![2]
        );
    }

    #[test]
    fn hits_restricted_to_range() {
        let buf = SourceBuffer::from_text("x = 1\ndef f():\n    x = 1\n");
        assert_eq!(anchor_lines(&buf, 2, 3, "x = 1", MatchMode::Exact), vec![3]);
    }
}
