//! The evaluation-error taxonomy.
//!
//! A single `Error` enum covers the pipeline: syntax errors before any
//! execution, resolve errors (possibly several per file), and evaluation
//! errors carrying an ordered call-stack snapshot. The textual form of
//! evaluation errors is a stable contract; hosts match on substrings.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::token::{Position, SyntaxError};

/// Classification of an evaluation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Value,
    Key,
    Index,
    Attribute,
    Frozen,
    Recursion,
    Internal,
    Other,
}

/// One entry of a call-stack snapshot, outermost first.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub name: Arc<str>,
    /// `None` for host builtins, rendered as `<builtin>`.
    pub pos: Option<FramePos>,
}

#[derive(Debug, Clone)]
pub struct FramePos {
    pub filename: Arc<str>,
    pub line: u32,
    pub col: u32,
}

/// A runtime failure, with the stack captured at the point of the error.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub kind: ErrorKind,
    pub msg: String,
    pub frames: Vec<TraceFrame>,
}

impl EvalError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        EvalError {
            kind,
            msg: msg.into(),
            frames: Vec::new(),
        }
    }

    pub fn typ(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, msg)
    }

    pub fn value(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, msg)
    }

    pub fn key(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Key, msg)
    }

    pub fn index(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Index, msg)
    }

    pub fn attr(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Attribute, msg)
    }

    pub fn frozen(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Frozen, msg)
    }

    pub fn recursion(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Recursion, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, msg)
    }

    /// Whether a call-stack snapshot has been attached yet.
    pub fn has_stack(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Render the full traceback, outermost frame first.
    pub fn backtrace(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for fr in &self.frames {
            match &fr.pos {
                Some(p) => {
                    out.push_str(&format!(
                        "  {}:{}:{}: in {}\n",
                        p.filename, p.line, p.col, fr.name
                    ));
                }
                None => {
                    out.push_str(&format!("  <builtin>: in {}\n", fr.name));
                }
            }
        }
        out.push_str(&format!("Error: {}", self.msg));
        out
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for EvalError {}

/// A scan or parse failure, located in a named file.
#[derive(Debug, Clone, Error)]
#[error("{filename}:{pos}: {msg}")]
pub struct ParseError {
    pub filename: Arc<str>,
    pub pos: Position,
    pub msg: String,
}

impl ParseError {
    pub fn from_syntax(filename: Arc<str>, err: SyntaxError) -> Self {
        ParseError {
            filename,
            pos: err.pos,
            msg: err.msg,
        }
    }
}

/// One resolver diagnostic.
#[derive(Debug, Clone)]
pub struct ResolveErrorItem {
    pub pos: Position,
    pub msg: String,
}

/// Name-resolution failure; a single resolve may report several errors.
#[derive(Debug, Clone)]
pub struct ResolveError {
    pub filename: Arc<str>,
    pub errors: Vec<ResolveErrorItem>,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "{}: resolve failed", self.filename),
            [first] => write!(f, "{}:{}: {}", self.filename, first.pos, first.msg),
            [first, rest @ ..] => write!(
                f,
                "{}:{}: {} (and {} more)",
                self.filename,
                first.pos,
                first.msg,
                rest.len()
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Top-level error type of the embedding API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// Compiled-module decode failure.
    #[error("{0}")]
    Decode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The evaluation error, if this is one.
    pub fn as_eval(&self) -> Option<&EvalError> {
        match self {
            Error::Eval(e) => Some(e),
            _ => None,
        }
    }
}
