//! Error taxonomy for the repair pipeline.
//!
//! Lookup misses are values callers branch on; parse failures and write
//! blockers are fatal for the run and map to distinct exit codes.

use miette::{Diagnostic, SourceSpan};
use serde::Serialize;
use std::path::PathBuf;

/// Low-level tokenizer fault, positioned by byte offset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFault {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated template literal")]
    UnterminatedTemplate,
    #[error("unterminated `${{` interpolation")]
    UnterminatedInterpolation,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("`{open}` is never closed")]
    Unclosed { open: char },
    #[error("`{close}` does not match `{open}`")]
    Mismatched { open: char, close: char },
    #[error("unexpected `{found}` with nothing open")]
    Unexpected { found: char },
}

/// Fault plus the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub fault: ParseFault,
    pub offset: usize,
}

impl LexError {
    pub fn new(fault: ParseFault, offset: usize) -> Self {
        Self { fault, offset }
    }
}

/// The corpus text cannot be located into safely; nothing may be written.
#[derive(Debug, thiserror::Error, Diagnostic)]
#[error("corpus parse error at line {line}, column {column}: {fault}")]
#[diagnostic(
    code(tmend::parse),
    help("fix the delimiter by hand or run `tmend escape` on the field before repairing")
)]
pub struct CorpusParseError {
    pub fault: ParseFault,
    pub offset: usize,
    pub line: usize,
    pub column: usize,

    #[source_code]
    pub src: String,

    #[label("detected here")]
    pub span: SourceSpan,
}

/// Why a locator lookup came back empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "miss", rename_all = "snake_case")]
pub enum LocateMiss {
    #[error("topic `{topic}` not found")]
    TopicNotFound { topic: String },

    #[error("field `{field}` not found in topic `{topic}`")]
    FieldNotFound { topic: String, field: String },

    #[error("topic id `{topic}` appears {count} times; refusing to pick one")]
    AmbiguousTopic { topic: String, count: usize },
}

/// Transform failures. Everything except `Reparse` and `RecordsChanged`
/// is recoverable at the run level.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error(transparent)]
    Lookup(#[from] LocateMiss),

    #[error("anchor field `{anchor}` not found in topic `{topic}`")]
    AnchorNotFound { topic: String, anchor: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transform produced text that no longer parses: {0}")]
    Reparse(Box<CorpusParseError>),

    #[error("transform changed the set of topic ids (missing: {missing:?}, added: {added:?})")]
    RecordsChanged {
        missing: Vec<String>,
        added: Vec<String>,
    },
}

impl TransformError {
    /// Per-topic misses: report and move on to the next operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransformError::Lookup(_)
                | TransformError::AnchorNotFound { .. }
                | TransformError::InvalidArgument(_)
        )
    }
}

/// Conditions that forbid writing the corpus back.
#[derive(Debug, thiserror::Error)]
pub enum WriteBlocked {
    #[error("duplicate topic ids block write-back: {}", .0.join(", "))]
    DuplicateIds(Vec<String>),

    #[error("topic ids changed during repair (missing: {missing:?}, added: {added:?})")]
    IdsChanged {
        missing: Vec<String>,
        added: Vec<String>,
    },

    #[error("{} changed on disk since it was loaded", .0.display())]
    ConcurrentModification(PathBuf),
}

/// Exit codes: 0=success, 2=incomplete (strict scan), 3=parse/invalid,
/// 4=write blocked, 5=internal
pub fn exit_code_for(e: &anyhow::Error) -> i32 {
    if e.downcast_ref::<CorpusParseError>().is_some() {
        return 3;
    }
    if e.downcast_ref::<WriteBlocked>().is_some() {
        return 4;
    }
    if e.downcast_ref::<IncompleteCorpus>().is_some() {
        return 2;
    }
    if e.downcast_ref::<LocateMiss>().is_some() || e.downcast_ref::<OperationsMissed>().is_some() {
        return 3;
    }
    if let Some(t) = e.downcast_ref::<TransformError>() {
        return match t {
            TransformError::RecordsChanged { .. } => 4,
            TransformError::Reparse(_) => 5,
            _ => 3,
        };
    }
    5
}

/// Strict scans fail when any topic is incomplete.
#[derive(Debug, thiserror::Error)]
#[error("{incomplete} of {total} topics are incomplete")]
pub struct IncompleteCorpus {
    pub incomplete: usize,
    pub total: usize,
}

/// Operations that matched nothing, when the caller asked for all to land.
#[derive(Debug, thiserror::Error)]
#[error("{missed} of {total} operations could not be applied")]
pub struct OperationsMissed {
    pub missed: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let blocked = anyhow::Error::new(WriteBlocked::DuplicateIds(vec!["x".into()]));
        assert_eq!(exit_code_for(&blocked), 4);

        let miss = anyhow::Error::new(TransformError::from(LocateMiss::TopicNotFound {
            topic: "x".into(),
        }));
        assert_eq!(exit_code_for(&miss), 3);

        let strict = anyhow::Error::new(IncompleteCorpus {
            incomplete: 1,
            total: 2,
        });
        assert_eq!(exit_code_for(&strict), 2);

        let lookup = anyhow::Error::new(LocateMiss::FieldNotFound {
            topic: "x".into(),
            field: "syntax".into(),
        });
        assert_eq!(exit_code_for(&lookup), 3);

        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), 5);
    }

    #[test]
    fn misses_are_recoverable() {
        let e = TransformError::AnchorNotFound {
            topic: "t".into(),
            anchor: "syntax".into(),
        };
        assert!(e.is_recoverable());

        let e = TransformError::RecordsChanged {
            missing: vec!["t".into()],
            added: vec![],
        };
        assert!(!e.is_recoverable());
    }
}
