//! Operation dispatch and edit semantics.

use core_bundle::{Anchor, IndentMode, InsertPosition, MatchMode, Operation};
use core_locate::{Located, LocateError, RangeMatch};
use tracing::debug;

use crate::anchor::anchor_lines;
use crate::buffer::SourceBuffer;
use crate::indent::{INDENT_UNIT, is_blank, leading_ws, reindent};
use crate::{OpStatus, indent};

/// Run-scoped knobs the applier needs.
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext {
    /// How many block lines an anchor-mismatch message may quote.
    pub context_lines: usize,
}

impl Default for ApplyContext {
    fn default() -> Self {
        Self { context_lines: 25 }
    }
}

/// What one operation did to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub status: OpStatus,
    pub range: Option<(usize, usize)>,
    pub message: String,
}

impl ApplyOutcome {
    fn new(status: OpStatus, range: Option<(usize, usize)>, message: impl Into<String>) -> Self {
        Self {
            status,
            range,
            message: message.into(),
        }
    }
}

/// Execute one operation against the buffer. Never panics and never leaves
/// the buffer half-edited: the buffer mutates only on `Applied`.
pub fn apply_operation(op: &Operation, buf: &mut SourceBuffer, ctx: &ApplyContext) -> ApplyOutcome {
    let outcome = match try_apply(op, buf, ctx) {
        Ok(outcome) => outcome,
        // Front-end failures surface as parse failures on the op, with the
        // error kind recorded, and never abort the remaining ops.
        Err(e) => ApplyOutcome::new(OpStatus::FailedParse, None, format!("LocateError: {e}")),
    };
    debug!(
        target: "edit",
        kind = op.kind(),
        status = outcome.status.as_str(),
        detail = %outcome.message,
        "op_done"
    );
    outcome
}

fn try_apply(
    op: &Operation,
    buf: &mut SourceBuffer,
    ctx: &ApplyContext,
) -> Result<ApplyOutcome, LocateError> {
    let Some(target) = op.target() else {
        // LIST_TARGETS never reaches the applier; the run engine answers it.
        return Ok(ApplyOutcome::new(
            OpStatus::FailedParse,
            None,
            "LIST_TARGETS has no buffer edit",
        ));
    };

    let text = buf.text();
    let m = match core_locate::locate(&text, &target.symbol)? {
        Located::Missing => {
            return Ok(ApplyOutcome::new(
                OpStatus::FailedNotFound,
                None,
                format!("target '{}' not found", target.symbol.describe()),
            ));
        }
        Located::Ambiguous(ms) => {
            let lines: Vec<String> = ms.iter().map(|m| m.start.to_string()).collect();
            return Ok(ApplyOutcome::new(
                OpStatus::FailedAmbiguous,
                None,
                format!(
                    "target '{}' matches {} definitions (lines {})",
                    target.symbol.describe(),
                    ms.len(),
                    lines.join(", ")
                ),
            ));
        }
        Located::One(m) => m,
    };

    Ok(match op {
        Operation::Replace { code, .. } => replace_region(buf, &m, code),
        Operation::InsertAfter { code, .. } => insert_adjacent(buf, &m, code, true)?,
        Operation::InsertBefore { code, .. } => insert_adjacent(buf, &m, code, false)?,
        Operation::AppendInto { code, .. } => append_into(buf, &m, code)?,
        Operation::PrependInto { code, .. } => prepend_into(buf, &m, code)?,
        Operation::InsertInto {
            code,
            anchor,
            indent,
            position,
            ..
        } => insert_into(buf, &m, code, anchor, *indent, *position, ctx)?,
        Operation::ReplaceLine { code, anchor, .. } => replace_line(buf, &m, code, anchor, ctx),
        Operation::ReplaceLines {
            code,
            anchor_start,
            anchor_end,
            match_mode,
            ..
        } => replace_lines(buf, &m, code, anchor_start, anchor_end, *match_mode, ctx),
        Operation::ReplaceExpr {
            anchor, old, new, ..
        } => replace_expr(buf, &m, anchor, old, new, ctx),
        Operation::ListTargets { .. } => unreachable!("handled above"),
    })
}

fn fail(status: OpStatus, m: &RangeMatch, message: impl Into<String>) -> ApplyOutcome {
    ApplyOutcome::new(status, Some((m.start, m.end)), message)
}

fn require_code(code: &str, m: &RangeMatch) -> Option<ApplyOutcome> {
    if code.trim().is_empty() {
        Some(fail(OpStatus::FailedParse, m, "empty code body"))
    } else {
        None
    }
}

/// Block targets only: into-family ops make no sense on an assignment.
fn require_block(m: &RangeMatch) -> Result<usize, ApplyOutcome> {
    m.body_start.ok_or_else(|| {
        fail(
            OpStatus::FailedParse,
            m,
            "requires a function, method, or class target",
        )
    })
}

// --- whole-region replace -------------------------------------------------

fn replace_region(buf: &mut SourceBuffer, m: &RangeMatch, code: &str) -> ApplyOutcome {
    if let Some(out) = require_code(code, m) {
        return out;
    }
    let prefix = leading_ws(buf.line(m.start).unwrap_or(""));
    let block = reindent(code, prefix);
    if buf.lines_in(m.start, m.end) == block.as_slice() {
        return fail(
            OpStatus::SkippedAlreadyApplied,
            m,
            "region already matches the replacement",
        );
    }
    buf.splice(m.start, m.end, block);
    fail(
        OpStatus::Applied,
        m,
        format!("replaced lines {}-{}", m.start, m.end),
    )
}

// --- sibling inserts ------------------------------------------------------

/// Duplicate-definition and signature-line guards shared by every insert.
fn insert_guard(
    file_text: &str,
    code: &str,
    sig: Option<&str>,
) -> Result<Option<ApplyOutcome>, LocateError> {
    let Some(sig) = sig else { return Ok(None) };
    if let Some(name) = leading_def_name(code) {
        if core_locate::has_function_named(file_text, name)? {
            return Ok(Some(ApplyOutcome::new(
                OpStatus::SkippedAlreadyPresent,
                None,
                format!("function '{name}' already defined in file"),
            )));
        }
        return Ok(None);
    }
    if file_text.contains(sig) {
        return Ok(Some(ApplyOutcome::new(
            OpStatus::SkippedAlreadyPresent,
            None,
            format!("signature line already present: {sig}"),
        )));
    }
    Ok(None)
}

/// Function name when the code block opens with a `def`.
fn leading_def_name(code: &str) -> Option<&str> {
    let sig = code.lines().map(str::trim).find(|l| !l.is_empty())?;
    let rest = sig.strip_prefix("async ").unwrap_or(sig);
    let rest = rest.strip_prefix("def ")?;
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if end == 0 { None } else { Some(&rest[..end]) }
}

fn insert_adjacent(
    buf: &mut SourceBuffer,
    m: &RangeMatch,
    code: &str,
    after: bool,
) -> Result<ApplyOutcome, LocateError> {
    if let Some(out) = require_code(code, m) {
        return Ok(out);
    }
    if let Some(skip) = insert_guard(&buf.text(), code, first_non_blank(code))? {
        return Ok(ApplyOutcome {
            range: Some((m.start, m.end)),
            ..skip
        });
    }
    let prefix = leading_ws(buf.line(m.start).unwrap_or("")).to_string();
    let mut block = reindent(code, &prefix);
    let at = if after { m.end + 1 } else { m.start };
    // One blank separator on either side when the neighbor is content.
    if at > 1 && buf.line(at - 1).is_some_and(|l| !is_blank(l)) {
        block.insert(0, String::new());
    }
    if buf.line(at).is_some_and(|l| !is_blank(l)) {
        block.push(String::new());
    }
    let count = block.len();
    buf.insert_lines(at, block);
    Ok(fail(
        OpStatus::Applied,
        m,
        format!(
            "inserted {count} line(s) {} line {}",
            if after { "after" } else { "before" },
            if after { m.end } else { m.start }
        ),
    ))
}

fn first_non_blank(code: &str) -> Option<&str> {
    code.lines().map(str::trim).find(|l| !l.is_empty())
}

// --- block-interior inserts ----------------------------------------------

fn append_into(
    buf: &mut SourceBuffer,
    m: &RangeMatch,
    code: &str,
) -> Result<ApplyOutcome, LocateError> {
    if let Some(out) = require_code(code, m) {
        return Ok(out);
    }
    let body_start = match require_block(m) {
        Ok(b) => b,
        Err(out) => return Ok(out),
    };
    if body_start == m.header {
        return Ok(fail(
            OpStatus::FailedParse,
            m,
            "block body shares its header line",
        ));
    }
    if let Some(skip) = insert_guard(&buf.text(), code, first_non_blank(code))? {
        return Ok(ApplyOutcome {
            range: Some((m.start, m.end)),
            ..skip
        });
    }
    let last = (m.start..=m.end)
        .rev()
        .find(|n| buf.line(*n).is_some_and(|l| !is_blank(l)))
        .unwrap_or(m.header);
    let prefix = leading_ws(buf.line(last).unwrap_or("")).to_string();
    let block = reindent(code, &prefix);
    let count = block.len();
    buf.insert_lines(last + 1, block);
    Ok(fail(
        OpStatus::Applied,
        m,
        format!("appended {count} line(s) after line {last}"),
    ))
}

fn prepend_into(
    buf: &mut SourceBuffer,
    m: &RangeMatch,
    code: &str,
) -> Result<ApplyOutcome, LocateError> {
    if let Some(out) = require_code(code, m) {
        return Ok(out);
    }
    let body_start = match require_block(m) {
        Ok(b) => b,
        Err(out) => return Ok(out),
    };
    if body_start == m.header {
        return Ok(fail(
            OpStatus::FailedParse,
            m,
            "block body shares its header line",
        ));
    }
    if let Some(skip) = insert_guard(&buf.text(), code, first_non_blank(code))? {
        return Ok(ApplyOutcome {
            range: Some((m.start, m.end)),
            ..skip
        });
    }
    let prefix = format!("{}{INDENT_UNIT}", leading_ws(buf.line(m.header).unwrap_or("")));
    let block = reindent(code, &prefix);
    let count = block.len();
    buf.insert_lines(body_start, block);
    Ok(fail(
        OpStatus::Applied,
        m,
        format!("prepended {count} line(s) at line {body_start}"),
    ))
}

// --- anchored edits -------------------------------------------------------

/// Resolve the anchor inside the block or explain why the op must not run.
fn resolve_anchor(
    buf: &SourceBuffer,
    m: &RangeMatch,
    anchor: &Anchor,
    ctx: &ApplyContext,
) -> Result<usize, ApplyOutcome> {
    if anchor.text.is_empty() {
        return Err(fail(OpStatus::FailedParse, m, "ANCHOR directive required"));
    }
    let hits = anchor_lines(buf, m.start, m.end, &anchor.text, anchor.match_mode);
    if hits.len() != anchor.expect {
        return Err(fail(
            OpStatus::SkippedAnchorMismatch,
            m,
            format!(
                "anchor '{}' matched {} line(s), expected {}; block starts: {}",
                anchor.text,
                hits.len(),
                anchor.expect,
                block_preview(buf, m, ctx.context_lines)
            ),
        ));
    }
    match hits.get(anchor.occurrence - 1) {
        Some(hit) => Ok(*hit),
        None => Err(fail(
            OpStatus::FailedParse,
            m,
            format!(
                "OCCURRENCE {} out of range ({} matches)",
                anchor.occurrence,
                hits.len()
            ),
        )),
    }
}

fn block_preview(buf: &SourceBuffer, m: &RangeMatch, limit: usize) -> String {
    buf.lines_in(m.start, m.end)
        .iter()
        .take(limit)
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn insert_into(
    buf: &mut SourceBuffer,
    m: &RangeMatch,
    code: &str,
    anchor: &Anchor,
    indent_mode: IndentMode,
    position: InsertPosition,
    ctx: &ApplyContext,
) -> Result<ApplyOutcome, LocateError> {
    if let Some(out) = require_code(code, m) {
        return Ok(out);
    }
    if let Err(out) = require_block(m) {
        return Ok(out);
    }
    let hit = match resolve_anchor(buf, m, anchor, ctx) {
        Ok(hit) => hit,
        Err(out) => return Ok(out),
    };
    let anchor_line = buf.line(hit).unwrap_or("").to_string();
    let anchor_indent = leading_ws(&anchor_line).to_string();
    let opens_block = anchor_line.trim_end().ends_with(':');

    let prefix = match indent_mode {
        IndentMode::Same => anchor_indent,
        IndentMode::Child => {
            if !opens_block && !has_deeper_line(buf, hit, m.end, &anchor_indent) {
                return Ok(fail(
                    OpStatus::FailedParse,
                    m,
                    "cannot infer child indent: anchor opens no block",
                ));
            }
            format!("{anchor_indent}{INDENT_UNIT}")
        }
        IndentMode::Auto => {
            if opens_block {
                format!("{anchor_indent}{INDENT_UNIT}")
            } else {
                anchor_indent
            }
        }
    };

    if let Some(skip) = insert_guard(&buf.text(), code, first_non_blank(code))? {
        return Ok(ApplyOutcome {
            range: Some((m.start, m.end)),
            ..skip
        });
    }
    let block = reindent(code, &prefix);
    let count = block.len();
    let at = match position {
        InsertPosition::After => hit + 1,
        InsertPosition::Before => hit,
    };
    buf.insert_lines(at, block);
    Ok(fail(
        OpStatus::Applied,
        m,
        format!(
            "inserted {count} line(s) {} anchor line {hit}",
            match position {
                InsertPosition::After => "after",
                InsertPosition::Before => "before",
            }
        ),
    ))
}

fn has_deeper_line(buf: &SourceBuffer, after: usize, end: usize, indent: &str) -> bool {
    (after + 1..=end).any(|n| {
        buf.line(n)
            .is_some_and(|l| !is_blank(l) && leading_ws(l).len() > indent.len())
    })
}

fn replace_line(
    buf: &mut SourceBuffer,
    m: &RangeMatch,
    code: &str,
    anchor: &Anchor,
    ctx: &ApplyContext,
) -> ApplyOutcome {
    if let Some(out) = require_code(code, m) {
        return out;
    }
    if let Err(out) = require_block(m) {
        return out;
    }
    let hit = match resolve_anchor(buf, m, anchor, ctx) {
        Ok(hit) => hit,
        Err(out) => return out,
    };
    let dedented = indent::dedent(code);
    let mut content: Vec<&String> = dedented.iter().filter(|l| !l.is_empty()).collect();
    let Some(line) = content.pop().filter(|_| content.is_empty()) else {
        return fail(
            OpStatus::FailedParse,
            m,
            "REPLACE_LINE takes exactly one line of code",
        );
    };
    let existing = buf.line(hit).unwrap_or("").to_string();
    let new_line = format!("{}{}", leading_ws(&existing), line);
    if new_line == existing {
        return fail(
            OpStatus::SkippedAlreadyApplied,
            m,
            format!("line {hit} already has the desired content"),
        );
    }
    buf.replace_line(hit, new_line);
    fail(OpStatus::Applied, m, format!("replaced line {hit}"))
}

fn replace_lines(
    buf: &mut SourceBuffer,
    m: &RangeMatch,
    code: &str,
    anchor_start: &str,
    anchor_end: &str,
    match_mode: MatchMode,
    ctx: &ApplyContext,
) -> ApplyOutcome {
    if let Some(out) = require_code(code, m) {
        return out;
    }
    if let Err(out) = require_block(m) {
        return out;
    }
    let mut bounds = [0usize; 2];
    for (slot, (key, text)) in [("ANCHOR_START", anchor_start), ("ANCHOR_END", anchor_end)]
        .iter()
        .enumerate()
    {
        if text.is_empty() {
            return fail(OpStatus::FailedParse, m, format!("{key} directive required"));
        }
        let hits = anchor_lines(buf, m.start, m.end, text, match_mode);
        if hits.len() != 1 {
            return fail(
                OpStatus::SkippedAnchorMismatch,
                m,
                format!(
                    "{key} '{}' matched {} line(s), expected 1; block starts: {}",
                    text,
                    hits.len(),
                    block_preview(buf, m, ctx.context_lines)
                ),
            );
        }
        bounds[slot] = hits[0];
    }
    let [a, b] = bounds;
    if b < a {
        return fail(
            OpStatus::FailedParse,
            m,
            format!("ANCHOR_END (line {b}) precedes ANCHOR_START (line {a})"),
        );
    }
    let prefix = leading_ws(buf.line(a).unwrap_or(""));
    let block = reindent(code, prefix);
    if buf.lines_in(a, b) == block.as_slice() {
        return fail(
            OpStatus::SkippedAlreadyApplied,
            m,
            "range already matches the replacement",
        );
    }
    buf.splice(a, b, block);
    fail(OpStatus::Applied, m, format!("replaced lines {a}-{b}"))
}

fn replace_expr(
    buf: &mut SourceBuffer,
    m: &RangeMatch,
    anchor: &Anchor,
    old: &str,
    new: &str,
    ctx: &ApplyContext,
) -> ApplyOutcome {
    if let Err(out) = require_block(m) {
        return out;
    }
    if old.is_empty() {
        return fail(OpStatus::FailedParse, m, "OLD directive required");
    }
    let hit = match resolve_anchor(buf, m, anchor, ctx) {
        Ok(hit) => hit,
        Err(out) => return out,
    };
    let existing = buf.line(hit).unwrap_or("").to_string();
    if !existing.contains(old) {
        return fail(
            OpStatus::FailedParse,
            m,
            format!("OLD text not found in anchored line {hit}"),
        );
    }
    let new_line = existing.replacen(old, new, 1);
    if new_line == existing {
        return fail(
            OpStatus::SkippedAlreadyApplied,
            m,
            format!("line {hit} already has the desired content"),
        );
    }
    buf.replace_line(hit, new_line);
    fail(
        OpStatus::Applied,
        m,
        format!("substituted expression on line {hit}"),
    )
}
