//! Error kinds and the boundary error type: a checked discriminant enum
//! plus a message, reported through a hand-written `Display` rather than a
//! derive macro.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

/// Checked error discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    LexError,
    CompileError,
    RuntimeError,
    IndexError,
    KeyNotFound,
    TypeError,
    TooManyArguments,
    UndefinedIdentifier,
    UndefinedLocal,
    LimitExceeded,
}

/// Where in the source an error occurred: the emission-context label (e.g.
/// `"<main>"`, `"function"`) plus the line number, used to build the
/// `"[<context> line <n>]"` suffix of the reported message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    pub context: String,
    pub line: u32,
}

impl SourceLoc {
    pub fn new(context: impl Into<String>, line: u32) -> Self {
        Self { context: context.into(), line }
    }
}

/// The single error type crossing the `Interpreter` boundary.
#[derive(Debug, Clone)]
pub struct MsError {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: Option<SourceLoc>,
}

impl MsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), loc: None }
    }

    #[must_use]
    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        if self.loc.is_none() {
            self.loc = Some(loc);
        }
        self
    }

    pub fn lex(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::LexError, msg)
    }

    pub fn compile(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::CompileError, msg)
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, msg)
    }

    pub fn index(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::IndexError, msg)
    }

    pub fn key_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::KeyNotFound, msg)
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, msg)
    }

    pub fn too_many_arguments(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooManyArguments, msg)
    }

    pub fn undefined_identifier(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UndefinedIdentifier, msg)
    }

    pub fn undefined_local(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UndefinedLocal, msg)
    }

    pub fn limit_exceeded(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::LimitExceeded, msg)
    }
}

impl fmt::Display for MsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(loc) = &self.loc {
            write!(f, " [{} line {}]", loc.context, loc.line)?;
        }
        Ok(())
    }
}

impl std::error::Error for MsError {}

pub type MsResult<T> = Result<T, MsError>;
