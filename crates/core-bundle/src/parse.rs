//! Line-oriented bundle tokenizer.

use tracing::debug;

use crate::target::parse_target;
use crate::{
    Anchor, BundleError, IndentMode, InsertPosition, MatchMode, Operation,
};

const HEADERS: [&str; 10] = [
    "REPLACE",
    "REPLACE_LINE",
    "REPLACE_LINES",
    "REPLACE_EXPR",
    "INSERT_AFTER",
    "INSERT_BEFORE",
    "INSERT_INTO",
    "APPEND_INTO",
    "PREPEND_INTO",
    "LIST_TARGETS",
];

const DIRECTIVE_KEYS: [&str; 10] = [
    "ANCHOR_START",
    "ANCHOR_END",
    "ANCHOR",
    "EXPECT",
    "OCCURRENCE",
    "MATCH",
    "INDENT",
    "POSITION",
    "OLD",
    "NEW",
];

/// Parse a bundle into its ordered operation list.
///
/// Blank lines between operations are ignored; `DEFAULT_FILE` lines update
/// the inherited file for every subsequent op. Any other unindented line that
/// is not a known header fails the whole bundle.
pub fn parse_bundle(text: &str) -> Result<Vec<Operation>, BundleError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut ops = Vec::new();
    let mut default_file: Option<String> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }
        let Some((head, rest)) = leading_token(line) else {
            return Err(BundleError::UnknownHeader {
                line: i + 1,
                text: line.trim_end().to_string(),
            });
        };
        if head == "DEFAULT_FILE" {
            let path = rest.trim();
            if path.is_empty() {
                return Err(BundleError::MissingDefaultFile { line: i + 1 });
            }
            default_file = Some(path.to_string());
            i += 1;
            continue;
        }
        if !HEADERS.contains(&head) {
            return Err(BundleError::UnknownHeader {
                line: i + 1,
                text: line.trim_end().to_string(),
            });
        }

        let mut end = i + 1;
        while end < lines.len() && !is_block_boundary(lines[end]) {
            end += 1;
        }
        let mut body: Vec<&str> = lines[i + 1..end].to_vec();
        while body.last().is_some_and(|l| l.trim().is_empty()) {
            body.pop();
        }
        let op = build_operation(head, rest.trim(), &body, default_file.as_deref(), i + 1)?;
        debug!(target: "bundle", kind = op.kind(), op_target = %op.target_display(), "op_parsed");
        ops.push(op);
        i = end;
    }

    if ops.is_empty() {
        return Err(BundleError::Empty);
    }
    Ok(ops)
}

/// First whitespace-delimited token of an unindented line. Indented lines are
/// body content and never open a block.
fn leading_token(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) => Some((head, rest)),
        None => Some((line, "")),
    }
}

fn is_block_boundary(line: &str) -> bool {
    match leading_token(line) {
        Some((head, _)) => head == "DEFAULT_FILE" || HEADERS.contains(&head),
        None => false,
    }
}

#[derive(Default)]
struct Directives {
    anchor: Option<String>,
    anchor_start: Option<String>,
    anchor_end: Option<String>,
    expect: Option<usize>,
    occurrence: Option<usize>,
    match_mode: Option<MatchMode>,
    indent: Option<IndentMode>,
    position: Option<InsertPosition>,
    old: Option<String>,
    new: Option<String>,
}

impl Directives {
    fn anchor(&self) -> Anchor {
        Anchor {
            text: self.anchor.clone().unwrap_or_default(),
            expect: self.expect.unwrap_or(1),
            occurrence: self.occurrence.unwrap_or(1),
            match_mode: self.match_mode.unwrap_or_default(),
        }
    }
}

/// Split the body of a directive-bearing op into its `KEY: VALUE` prefix and
/// the verbatim code lines. The first non-blank line that is not a directive
/// ends the prefix.
fn split_directives<'a>(body: &[&'a str]) -> (Directives, Vec<&'a str>) {
    let mut d = Directives::default();
    let mut code_start = body.len();
    for (idx, line) in body.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = parse_directive(line) else {
            code_start = idx;
            break;
        };
        match key {
            "ANCHOR" => d.anchor = Some(value.to_string()),
            "ANCHOR_START" => d.anchor_start = Some(value.to_string()),
            "ANCHOR_END" => d.anchor_end = Some(value.to_string()),
            // Malformed or non-positive integers silently fall back to 1.
            "EXPECT" => d.expect = Some(parse_count(value)),
            "OCCURRENCE" => d.occurrence = Some(parse_count(value)),
            "MATCH" => {
                d.match_mode = Some(match value.trim() {
                    "fuzzy" => MatchMode::Fuzzy,
                    _ => MatchMode::Exact,
                })
            }
            "INDENT" => {
                d.indent = Some(match value.trim() {
                    "same" => IndentMode::Same,
                    "child" => IndentMode::Child,
                    _ => IndentMode::Auto,
                })
            }
            "POSITION" => {
                d.position = Some(match value.trim() {
                    "before" => InsertPosition::Before,
                    _ => InsertPosition::After,
                })
            }
            "OLD" => d.old = Some(value.to_string()),
            "NEW" => d.new = Some(value.to_string()),
            _ => unreachable!("key restricted to DIRECTIVE_KEYS"),
        }
    }
    (d, body[code_start..].to_vec())
}

fn parse_directive(line: &str) -> Option<(&'static str, &str)> {
    let t = line.trim_start();
    for key in DIRECTIVE_KEYS {
        if let Some(rest) = t.strip_prefix(key)
            && let Some(value) = rest.strip_prefix(':')
        {
            return Some((key, value.strip_prefix(' ').unwrap_or(value)));
        }
    }
    None
}

fn parse_count(value: &str) -> usize {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n >= 1)
        .unwrap_or(1)
}

fn join_code(lines: &[&str]) -> String {
    lines.join("\n")
}

fn build_operation(
    kind: &str,
    target_text: &str,
    body: &[&str],
    default_file: Option<&str>,
    header_line: usize,
) -> Result<Operation, BundleError> {
    if kind == "LIST_TARGETS" {
        let file = if target_text.is_empty() {
            default_file.map(String::from)
        } else {
            Some(target_text.to_string())
        };
        return Ok(Operation::ListTargets { file });
    }

    if target_text.is_empty() {
        return Err(BundleError::MissingTarget {
            line: header_line,
            kind: kind.to_string(),
        });
    }
    let target =
        parse_target(target_text, default_file).map_err(|reason| BundleError::BadTarget {
            line: header_line,
            text: target_text.to_string(),
            reason,
        })?;

    let op = match kind {
        "REPLACE" => Operation::Replace {
            target,
            code: join_code(body),
        },
        "INSERT_AFTER" => Operation::InsertAfter {
            target,
            code: join_code(body),
        },
        "INSERT_BEFORE" => Operation::InsertBefore {
            target,
            code: join_code(body),
        },
        "APPEND_INTO" => Operation::AppendInto {
            target,
            code: join_code(body),
        },
        "PREPEND_INTO" => Operation::PrependInto {
            target,
            code: join_code(body),
        },
        "INSERT_INTO" => {
            let (d, code) = split_directives(body);
            Operation::InsertInto {
                target,
                code: join_code(&code),
                anchor: d.anchor(),
                indent: d.indent.unwrap_or_default(),
                position: d.position.unwrap_or_default(),
            }
        }
        "REPLACE_LINE" => {
            let (d, code) = split_directives(body);
            Operation::ReplaceLine {
                target,
                code: join_code(&code),
                anchor: d.anchor(),
            }
        }
        "REPLACE_LINES" => {
            let (d, code) = split_directives(body);
            Operation::ReplaceLines {
                target,
                code: join_code(&code),
                anchor_start: d.anchor_start.unwrap_or_default(),
                anchor_end: d.anchor_end.unwrap_or_default(),
                match_mode: d.match_mode.unwrap_or_default(),
            }
        }
        "REPLACE_EXPR" => {
            let (d, _) = split_directives(body);
            Operation::ReplaceExpr {
                target,
                anchor: d.anchor(),
                old: d.old.unwrap_or_default(),
                new: d.new.unwrap_or_default(),
            }
        }
        _ => unreachable!("kind restricted to HEADERS"),
    };
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;

    #[test]
    fn parses_replace_with_code() {
        let ops = parse_bundle("REPLACE a.py::C.a\n    def a(self):\n        return 10\n").unwrap();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            Operation::Replace { target, code } => {
                assert_eq!(target.file.as_deref(), Some("a.py"));
                assert_eq!(
                    target.symbol,
                    Symbol::Method {
                        class: "C".into(),
                        name: "a".into()
                    }
                );
                assert_eq!(code, "    def a(self):\n        return 10");
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn default_file_inherits_until_overridden() {
        let text = "DEFAULT_FILE m.py\nREPLACE f\n    pass\nDEFAULT_FILE n.py\nREPLACE g\n    pass\n";
        let ops = parse_bundle(text).unwrap();
        assert_eq!(ops[0].file_ref(), Some("m.py"));
        assert_eq!(ops[1].file_ref(), Some("n.py"));
    }

    #[test]
    fn explicit_file_wins_over_default() {
        let ops = parse_bundle("DEFAULT_FILE m.py\nREPLACE x.py::f\n    pass\n").unwrap();
        assert_eq!(ops[0].file_ref(), Some("x.py"));
    }

    #[test]
    fn insert_into_directives() {
        let text = "INSERT_INTO a.py::fn\nANCHOR: if x:\nEXPECT: 2\nOCCURRENCE: 2\nMATCH: fuzzy\nINDENT: child\nPOSITION: before\n    y = 1\n";
        let ops = parse_bundle(text).unwrap();
        match &ops[0] {
            Operation::InsertInto {
                code,
                anchor,
                indent,
                position,
                ..
            } => {
                assert_eq!(anchor.text, "if x:");
                assert_eq!(anchor.expect, 2);
                assert_eq!(anchor.occurrence, 2);
                assert_eq!(anchor.match_mode, MatchMode::Fuzzy);
                assert_eq!(*indent, IndentMode::Child);
                assert_eq!(*position, InsertPosition::Before);
                assert_eq!(code, "    y = 1");
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn directive_value_keeps_trailing_colon() {
        let ops = parse_bundle("INSERT_INTO a.py::fn\nANCHOR: for item in items:\n    x = 1\n")
            .unwrap();
        match &ops[0] {
            Operation::InsertInto { anchor, .. } => assert_eq!(anchor.text, "for item in items:"),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn malformed_counts_default_to_one() {
        let text = "REPLACE_LINE a.py::fn\nANCHOR: x = 1\nEXPECT: zero\nOCCURRENCE: -3\nx = 2\n";
        let ops = parse_bundle(text).unwrap();
        match &ops[0] {
            Operation::ReplaceLine { anchor, code, .. } => {
                assert_eq!(anchor.expect, 1);
                assert_eq!(anchor.occurrence, 1);
                assert_eq!(code, "x = 2");
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn replace_expr_old_new() {
        let text = "REPLACE_EXPR a.py::fn\nANCHOR: return a + b\nOLD: a + b\nNEW: a - b\n";
        let ops = parse_bundle(text).unwrap();
        match &ops[0] {
            Operation::ReplaceExpr { old, new, .. } => {
                assert_eq!(old, "a + b");
                assert_eq!(new, "a - b");
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn anchor_start_not_swallowed_by_anchor() {
        let text = "REPLACE_LINES a.py::fn\nANCHOR_START: begin\nANCHOR_END: end\n    pass\n";
        let ops = parse_bundle(text).unwrap();
        match &ops[0] {
            Operation::ReplaceLines {
                anchor_start,
                anchor_end,
                ..
            } => {
                assert_eq!(anchor_start, "begin");
                assert_eq!(anchor_end, "end");
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn unknown_header_fails_whole_bundle() {
        let err = parse_bundle("FROBNICATE a.py::f\n    pass\n").unwrap_err();
        assert!(matches!(err, BundleError::UnknownHeader { line: 1, .. }));
    }

    #[test]
    fn blank_lines_between_ops_ignored() {
        let text = "\nREPLACE a.py::f\n    pass\n\n\nREPLACE a.py::g\n    pass\n";
        assert_eq!(parse_bundle(text).unwrap().len(), 2);
    }

    #[test]
    fn list_targets_bare_file_and_default() {
        let ops = parse_bundle("LIST_TARGETS a.py").unwrap();
        assert_eq!(ops[0].file_ref(), Some("a.py"));
        let ops = parse_bundle("DEFAULT_FILE b.py\nLIST_TARGETS").unwrap();
        assert_eq!(ops[0].file_ref(), Some("b.py"));
    }

    #[test]
    fn empty_bundle_is_an_error() {
        assert!(matches!(parse_bundle("\n  \n"), Err(BundleError::Empty)));
    }

    #[test]
    fn sig_is_first_non_blank_code_line() {
        let ops = parse_bundle("INSERT_AFTER a.py::f\n\n    def c(self):\n        return 3\n").unwrap();
        assert_eq!(ops[0].sig(), Some("def c(self):"));
    }
}
