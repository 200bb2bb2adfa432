//! Patch bundle model and parser.
//!
//! A bundle is a line-oriented declarative document: `DEFAULT_FILE` lines set
//! the inherited target file, operation headers open a block, and everything
//! up to the next header is that operation's body. Directive-bearing kinds
//! (`INSERT_INTO`, `REPLACE_LINE`, `REPLACE_LINES`, `REPLACE_EXPR`) consume a
//! `KEY: VALUE` prefix of the body before the verbatim code lines.
//!
//! Parsing is pure classification; nothing here touches the filesystem or the
//! syntax tree. Target resolution and edit semantics live in `core-locate`
//! and `core-edit`.

use thiserror::Error;

mod parse;
mod target;

pub use parse::parse_bundle;
pub use target::{Symbol, Target};

/// Whitespace treatment when matching an anchor substring against a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Exact,
    /// Runs of internal whitespace collapse to a single space on both sides
    /// before the containment check. The candidate line is not trimmed.
    Fuzzy,
}

/// How the insertion indent is inferred for `INSERT_INTO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndentMode {
    /// Child if the anchor line ends with a block-opening colon, else same.
    #[default]
    Auto,
    Same,
    Child,
}

/// Insertion side relative to the anchor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPosition {
    Before,
    #[default]
    After,
}

/// Anchor directives shared by the anchored operation kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Substring located within the target block. Empty means the bundle
    /// never supplied an `ANCHOR` directive; the applier rejects the op.
    pub text: String,
    /// Required number of matching lines inside the block.
    pub expect: usize,
    /// Which hit to edit, 1-based.
    pub occurrence: usize,
    pub match_mode: MatchMode,
}

impl Default for Anchor {
    fn default() -> Self {
        Self {
            text: String::new(),
            expect: 1,
            occurrence: 1,
            match_mode: MatchMode::Exact,
        }
    }
}

/// One parsed bundle operation. Each variant carries only the directive
/// fields its kind recognizes; everything else in the body is the code block,
/// kept verbatim (trailing blank lines stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Replace {
        target: Target,
        code: String,
    },
    InsertAfter {
        target: Target,
        code: String,
    },
    InsertBefore {
        target: Target,
        code: String,
    },
    AppendInto {
        target: Target,
        code: String,
    },
    PrependInto {
        target: Target,
        code: String,
    },
    InsertInto {
        target: Target,
        code: String,
        anchor: Anchor,
        indent: IndentMode,
        position: InsertPosition,
    },
    ReplaceLine {
        target: Target,
        code: String,
        anchor: Anchor,
    },
    ReplaceLines {
        target: Target,
        code: String,
        anchor_start: String,
        anchor_end: String,
        match_mode: MatchMode,
    },
    ReplaceExpr {
        target: Target,
        anchor: Anchor,
        old: String,
        new: String,
    },
    /// Meta-op: enumerate every resolvable target in a file. The file may be
    /// inherited from `DEFAULT_FILE` or the orchestrator's current file.
    ListTargets {
        file: Option<String>,
    },
}

impl Operation {
    /// Header token this operation was parsed from.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Replace { .. } => "REPLACE",
            Operation::InsertAfter { .. } => "INSERT_AFTER",
            Operation::InsertBefore { .. } => "INSERT_BEFORE",
            Operation::AppendInto { .. } => "APPEND_INTO",
            Operation::PrependInto { .. } => "PREPEND_INTO",
            Operation::InsertInto { .. } => "INSERT_INTO",
            Operation::ReplaceLine { .. } => "REPLACE_LINE",
            Operation::ReplaceLines { .. } => "REPLACE_LINES",
            Operation::ReplaceExpr { .. } => "REPLACE_EXPR",
            Operation::ListTargets { .. } => "LIST_TARGETS",
        }
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            Operation::Replace { target, .. }
            | Operation::InsertAfter { target, .. }
            | Operation::InsertBefore { target, .. }
            | Operation::AppendInto { target, .. }
            | Operation::PrependInto { target, .. }
            | Operation::InsertInto { target, .. }
            | Operation::ReplaceLine { target, .. }
            | Operation::ReplaceLines { target, .. }
            | Operation::ReplaceExpr { target, .. } => Some(target),
            Operation::ListTargets { .. } => None,
        }
    }

    /// File reference the operation resolves against, already folded with the
    /// bundle's `DEFAULT_FILE` at parse time. `None` falls back to the
    /// orchestrator-supplied current file.
    pub fn file_ref(&self) -> Option<&str> {
        match self {
            Operation::ListTargets { file } => file.as_deref(),
            _ => self.target().and_then(|t| t.file.as_deref()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Operation::Replace { code, .. }
            | Operation::InsertAfter { code, .. }
            | Operation::InsertBefore { code, .. }
            | Operation::AppendInto { code, .. }
            | Operation::PrependInto { code, .. }
            | Operation::InsertInto { code, .. }
            | Operation::ReplaceLine { code, .. }
            | Operation::ReplaceLines { code, .. } => code,
            Operation::ReplaceExpr { .. } | Operation::ListTargets { .. } => "",
        }
    }

    /// First non-blank code line, trimmed. Used by the idempotence guards.
    pub fn sig(&self) -> Option<&str> {
        self.code()
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
    }

    /// Human-readable target text for result records and logs.
    pub fn target_display(&self) -> String {
        match self {
            Operation::ListTargets { file } => file.clone().unwrap_or_else(|| "<current>".into()),
            _ => self
                .target()
                .map(|t| t.raw.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("line {line}: unknown operation header: {text}")]
    UnknownHeader { line: usize, text: String },
    #[error("line {line}: DEFAULT_FILE requires a path")]
    MissingDefaultFile { line: usize },
    #[error("line {line}: {kind} requires a target")]
    MissingTarget { line: usize, kind: String },
    #[error("line {line}: invalid target '{text}': {reason}")]
    BadTarget {
        line: usize,
        text: String,
        reason: String,
    },
    #[error("bundle contains no operations")]
    Empty,
}
