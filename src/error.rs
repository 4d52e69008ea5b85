//! Compilation error taxonomy.
//!
//! Every stage of the pipeline fails fast with a [`CompileError`] tagged with
//! the originating stage. Parse and resolve errors carry a byte-offset span
//! into the original source so callers can point at the offending text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte-offset range into the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Shift both offsets by `offset`. Used when re-lexing interpolated
    /// string fragments, whose spans are relative to the fragment.
    pub fn shifted(self, offset: usize) -> Self {
        Span {
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

/// What went wrong during name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveErrorKind {
    UnresolvedName,
    UnknownFunction,
    AmbiguousReference,
    ArityMismatch,
    InvalidTake,
    InvalidTransform,
}

/// A failure in one of the compilation stages.
///
/// The variant identifies the stage; the compilation is all-or-nothing, so a
/// caller never receives partial SQL alongside one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("parse error: {message}")]
    Parse { message: String, span: Option<Span> },

    #[error("resolve error: {message}")]
    Resolve {
        kind: ResolveErrorKind,
        message: String,
        span: Option<Span>,
    },

    #[error("generate error: {message}")]
    Generate { message: String },
}

impl CompileError {
    pub fn parse(message: impl Into<String>, span: Option<Span>) -> Self {
        CompileError::Parse {
            message: message.into(),
            span,
        }
    }

    pub fn resolve(
        kind: ResolveErrorKind,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        CompileError::Resolve {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn generate(message: impl Into<String>) -> Self {
        CompileError::Generate {
            message: message.into(),
        }
    }

    /// The stage this error originated in.
    pub fn stage(&self) -> &'static str {
        match self {
            CompileError::Parse { .. } => "parse",
            CompileError::Resolve { .. } => "resolve",
            CompileError::Generate { .. } => "generate",
        }
    }

    /// The source span, when the stage tracks one.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Parse { span, .. } => *span,
            CompileError::Resolve { span, .. } => *span,
            CompileError::Generate { .. } => None,
        }
    }
}
