//! Edit applier: executes one bundle operation against an in-memory buffer.
//!
//! Every block edit shares the same skeleton: locate the target range,
//! resolve anchors inside it where the kind calls for them, run the
//! idempotence guards, then rewrite lines with inferred indentation. The
//! applier never touches the filesystem; the run engine owns file IO,
//! verification, and rollback.

use serde::{Deserialize, Serialize};

pub mod anchor;
pub mod apply;
pub mod buffer;
pub mod indent;

pub use apply::{ApplyContext, ApplyOutcome, apply_operation};
pub use buffer::SourceBuffer;

/// Terminal status of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpStatus {
    /// Edit committed and the file compiled.
    Applied,
    /// The edit would leave the file byte-identical.
    SkippedAlreadyApplied,
    /// Idempotence guard: the inserted definition or signature line already
    /// exists in the file.
    SkippedAlreadyPresent,
    /// Anchor hit count differed from `EXPECT`. A soft skip so re-applying a
    /// half-applied bundle stays safe.
    SkippedAnchorMismatch,
    FailedNotFound,
    FailedAmbiguous,
    FailedParse,
    FailedInvalidPath,
    FailedIo,
    FailedCompile,
}

impl OpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Applied => "APPLIED",
            OpStatus::SkippedAlreadyApplied => "SKIPPED_ALREADY_APPLIED",
            OpStatus::SkippedAlreadyPresent => "SKIPPED_ALREADY_PRESENT",
            OpStatus::SkippedAnchorMismatch => "SKIPPED_ANCHOR_MISMATCH",
            OpStatus::FailedNotFound => "FAILED_NOT_FOUND",
            OpStatus::FailedAmbiguous => "FAILED_AMBIGUOUS",
            OpStatus::FailedParse => "FAILED_PARSE",
            OpStatus::FailedInvalidPath => "FAILED_INVALID_PATH",
            OpStatus::FailedIo => "FAILED_IO",
            OpStatus::FailedCompile => "FAILED_COMPILE",
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, OpStatus::Applied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            OpStatus::FailedNotFound
                | OpStatus::FailedAmbiguous
                | OpStatus::FailedParse
                | OpStatus::FailedInvalidPath
                | OpStatus::FailedIo
                | OpStatus::FailedCompile
        )
    }
}

impl std::fmt::Display for OpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
