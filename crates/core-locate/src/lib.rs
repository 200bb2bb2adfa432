//! Structural locator over the Python syntax tree.
//!
//! Resolves symbolic targets (function, method, whole class, module/class
//! assignment) to 1-based inclusive line ranges using tree-sitter. Start
//! lines include decorators; end lines are clamped to the line before the
//! next sibling so a replace can never swallow a sibling inserted earlier in
//! the same run.

use core_bundle::Symbol;
use thiserror::Error;
use tracing::trace;
use tree_sitter::{Node, Parser, Tree};

/// One resolved match, all line numbers 1-based inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeMatch {
    /// First line of the symbol, decorators included.
    pub start: usize,
    /// Last line, clamped by the next sibling when one exists.
    pub end: usize,
    /// Line of the `def` / `class` keyword itself (after any decorators),
    /// or the assignment line.
    pub header: usize,
    /// First line of the block body for functions and classes; `None` for
    /// assignments.
    pub body_start: Option<usize>,
    pub name: String,
}

/// Locator outcome: a single range, several colliding matches, or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    One(RangeMatch),
    Ambiguous(Vec<RangeMatch>),
    Missing,
}

#[derive(Debug, Error)]
pub enum LocateError {
    /// The grammar could not be loaded into the tree-sitter runtime. Fatal:
    /// without it no range has reliable line information.
    #[error("language front-end unavailable: {0}")]
    Frontend(String),
    #[error("source parse produced no syntax tree")]
    Parse,
}

/// First syntax problem found in a source, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub line: usize,
    pub detail: String,
}

impl std::fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} near line {}", self.detail, self.line)
    }
}

fn parser() -> Result<Parser, LocateError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| LocateError::Frontend(e.to_string()))?;
    Ok(parser)
}

/// Verify the front-end loads before any run begins.
pub fn ensure_frontend() -> Result<(), LocateError> {
    parser().map(|_| ())
}

fn parse(source: &str) -> Result<Tree, LocateError> {
    parser()?.parse(source, None).ok_or(LocateError::Parse)
}

fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// Unwrap a `decorated_definition` down to the definition it decorates.
fn definition_of<'t>(node: Node<'t>) -> Node<'t> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition").unwrap_or(node)
    } else {
        node
    }
}

fn def_name<'a>(node: Node<'_>, source: &'a str) -> Option<&'a str> {
    let def = definition_of(node);
    match def.kind() {
        "function_definition" | "class_definition" => {
            def.child_by_field_name("name").map(|n| node_text(n, source))
        }
        _ => None,
    }
}

/// Name bound by a top-level or class-level assignment statement, covering
/// plain (`x = 1`) and annotated (`x: int = 1`) single-name targets.
fn assign_name<'a>(node: Node<'_>, source: &'a str) -> Option<&'a str> {
    if node.kind() != "expression_statement" {
        return None;
    }
    let inner = node.named_child(0)?;
    if inner.kind() != "assignment" {
        return None;
    }
    let left = inner.child_by_field_name("left")?;
    if left.kind() == "identifier" {
        Some(node_text(left, source))
    } else {
        None
    }
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Build a match for `children[idx]`, clamping the end to the line before
/// the next sibling at the same level.
fn range_of(children: &[Node<'_>], idx: usize, name: &str) -> RangeMatch {
    let outer = children[idx];
    let def = definition_of(outer);
    let start = outer.start_position().row + 1;
    let node_end = outer.end_position().row + 1;
    let end = match children.get(idx + 1) {
        Some(next) => {
            let clamped = next.start_position().row; // next start (1-based) minus one
            if clamped >= start { clamped } else { node_end }
        }
        None => node_end,
    };
    let body_start = match def.kind() {
        "function_definition" | "class_definition" => def
            .child_by_field_name("body")
            .map(|b| b.start_position().row + 1),
        _ => None,
    };
    RangeMatch {
        start,
        end,
        header: def.start_position().row + 1,
        body_start,
        name: name.to_string(),
    }
}

fn collect<'t>(
    children: &[Node<'t>],
    source: &str,
    name: &str,
    pred: impl Fn(Node<'t>, &str) -> bool,
) -> Vec<RangeMatch> {
    children
        .iter()
        .enumerate()
        .filter(|(_, node)| pred(**node, source))
        .map(|(idx, _)| range_of(children, idx, name))
        .collect()
}

fn classes_named<'t>(top: &[Node<'t>], source: &str, class: &str) -> Vec<Node<'t>> {
    top.iter()
        .copied()
        .filter(|n| {
            definition_of(*n).kind() == "class_definition" && def_name(*n, source) == Some(class)
        })
        .collect()
}

/// Resolve a symbolic target against a source string.
pub fn locate(source: &str, symbol: &Symbol) -> Result<Located, LocateError> {
    let tree = parse(source)?;
    let top = named_children(tree.root_node());

    let matches = match symbol {
        Symbol::Function(name) => collect(&top, source, name, |n, src| {
            definition_of(n).kind() == "function_definition"
                && def_name(n, src) == Some(name.as_str())
        }),
        Symbol::Class(name) => collect(&top, source, name, |n, src| {
            definition_of(n).kind() == "class_definition"
                && def_name(n, src) == Some(name.as_str())
        }),
        Symbol::ModuleAssign(name) => collect(&top, source, name, |n, src| {
            assign_name(n, src) == Some(name.as_str())
        }),
        Symbol::Method { class, name } => {
            let mut all = Vec::new();
            for class_node in classes_named(&top, source, class) {
                if let Some(body) = definition_of(class_node).child_by_field_name("body") {
                    let members = named_children(body);
                    all.extend(collect(&members, source, name, |n, src| {
                        definition_of(n).kind() == "function_definition"
                            && def_name(n, src) == Some(name.as_str())
                    }));
                }
            }
            all
        }
        Symbol::ClassAssign { class, name } => {
            let mut all = Vec::new();
            for class_node in classes_named(&top, source, class) {
                if let Some(body) = definition_of(class_node).child_by_field_name("body") {
                    let members = named_children(body);
                    all.extend(collect(&members, source, name, |n, src| {
                        assign_name(n, src) == Some(name.as_str())
                    }));
                }
            }
            all
        }
    };

    trace!(target: "locate", symbol = %symbol.describe(), hits = matches.len(), "located");
    Ok(if matches.len() > 1 {
        Located::Ambiguous(matches)
    } else if let Some(m) = matches.into_iter().next() {
        Located::One(m)
    } else {
        Located::Missing
    })
}

/// Every resolvable target expression in a file, in source order.
pub fn list_targets(source: &str) -> Result<Vec<String>, LocateError> {
    let tree = parse(source)?;
    let mut out = Vec::new();
    for node in named_children(tree.root_node()) {
        let def = definition_of(node);
        match def.kind() {
            "function_definition" => {
                if let Some(name) = def_name(node, source) {
                    out.push(name.to_string());
                }
            }
            "class_definition" => {
                let Some(class) = def_name(node, source) else {
                    continue;
                };
                out.push(format!("{class}.*"));
                if let Some(body) = def.child_by_field_name("body") {
                    for member in named_children(body) {
                        if let Some(name) = def_name(member, source) {
                            out.push(format!("{class}.{name}"));
                        } else if let Some(name) = assign_name(member, source) {
                            out.push(format!("{class}.@{name}"));
                        }
                    }
                }
            }
            _ => {
                if let Some(name) = assign_name(node, source) {
                    out.push(format!("@{name}"));
                }
            }
        }
    }
    Ok(out)
}

/// Whether any function of this name is defined anywhere in the file, at any
/// nesting depth. Drives the duplicate-definition idempotence guard.
pub fn has_function_named(source: &str, name: &str) -> Result<bool, LocateError> {
    let tree = parse(source)?;
    Ok(find_function(tree.root_node(), source, name))
}

fn find_function(node: Node<'_>, source: &str, name: &str) -> bool {
    if node.kind() == "function_definition"
        && node
            .child_by_field_name("name")
            .is_some_and(|n| node_text(n, source) == name)
    {
        return true;
    }
    named_children(node)
        .into_iter()
        .any(|child| find_function(child, source, name))
}

/// Parse the source and report the first syntax problem, if any. This is the
/// compile gate applied to every touched file after write-back.
pub fn check_syntax(source: &str) -> Result<Option<SyntaxIssue>, LocateError> {
    let tree = parse(source)?;
    let root = tree.root_node();
    if !root.has_error() {
        return Ok(None);
    }
    Ok(Some(first_issue(root).unwrap_or(SyntaxIssue {
        line: root.end_position().row + 1,
        detail: "syntax error".into(),
    })))
}

fn first_issue(node: Node<'_>) -> Option<SyntaxIssue> {
    if node.is_error() {
        return Some(SyntaxIssue {
            line: node.start_position().row + 1,
            detail: "syntax error".into(),
        });
    }
    if node.is_missing() {
        return Some(SyntaxIssue {
            line: node.start_position().row + 1,
            detail: format!("missing {}", node.kind()),
        });
    }
    let mut cursor = node.walk();
    node.children(&mut cursor).find_map(first_issue)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
import os

LIMIT = 10
RATE: float = 0.5

@wraps
def top(a):
    return a

class C:
    slot = 1

    def a(self):
        return 1

    def b(self):
        return 2

def tail():
    pass
";

    fn one(symbol: &Symbol) -> RangeMatch {
        match locate(SAMPLE, symbol).unwrap() {
            Located::One(m) => m,
            other => panic!("expected single match, got {other:?}"),
        }
    }

    #[test]
    fn function_start_includes_decorator() {
        let m = one(&Symbol::Function("top".into()));
        assert_eq!(m.start, 6);
        assert_eq!(m.header, 7);
        assert_eq!(m.body_start, Some(8));
    }

    #[test]
    fn function_end_clamps_to_next_sibling() {
        // `top` ends at line 8; class C starts at line 10, so the clamped
        // end is 9 (the blank separator belongs to the range).
        let m = one(&Symbol::Function("top".into()));
        assert_eq!(m.end, 9);
    }

    #[test]
    fn method_range_stops_before_sibling() {
        let m = one(&Symbol::Method {
            class: "C".into(),
            name: "a".into(),
        });
        assert_eq!((m.start, m.end), (13, 15));
    }

    #[test]
    fn last_method_ends_at_node_end() {
        let m = one(&Symbol::Method {
            class: "C".into(),
            name: "b".into(),
        });
        assert_eq!((m.start, m.end), (16, 17));
    }

    #[test]
    fn whole_class_range() {
        let m = one(&Symbol::Class("C".into()));
        assert_eq!(m.start, 10);
        assert_eq!(m.end, 18);
        assert_eq!(m.body_start, Some(11));
    }

    #[test]
    fn module_assignments_plain_and_annotated() {
        assert_eq!(one(&Symbol::ModuleAssign("LIMIT".into())).start, 3);
        assert_eq!(one(&Symbol::ModuleAssign("RATE".into())).start, 4);
    }

    #[test]
    fn class_assignment() {
        let m = one(&Symbol::ClassAssign {
            class: "C".into(),
            name: "slot".into(),
        });
        assert_eq!(m.start, 11);
    }

    #[test]
    fn missing_symbol() {
        assert_eq!(
            locate(SAMPLE, &Symbol::Function("nope".into())).unwrap(),
            Located::Missing
        );
    }

    #[test]
    fn duplicate_definitions_are_ambiguous() {
        let source = "def f():\n    pass\n\ndef f():\n    pass\n";
        match locate(source, &Symbol::Function("f".into())).unwrap() {
            Located::Ambiguous(ms) => assert_eq!(ms.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn lists_every_target_kind() {
        let targets = list_targets(SAMPLE).unwrap();
        assert_eq!(
            targets,
            vec![
                "@LIMIT", "@RATE", "top", "C.*", "C.@slot", "C.a", "C.b", "tail"
            ]
        );
    }

    #[test]
    fn finds_functions_at_any_depth() {
        assert!(has_function_named(SAMPLE, "a").unwrap());
        assert!(has_function_named(SAMPLE, "top").unwrap());
        assert!(!has_function_named(SAMPLE, "zzz").unwrap());
    }

    #[test]
    fn syntax_check_flags_bad_source() {
        assert!(check_syntax(SAMPLE).unwrap().is_none());
        let issue = check_syntax("def broken(:\n    pass\n").unwrap();
        assert!(issue.is_some());
    }
}
