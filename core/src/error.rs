use std::fmt;

use anyhow::Result;

/// Coarse classification of runtime errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    UndefinedName,
    TypeMismatch,
    Immutable,
    Range,
    Arity,
    RecursionLimit,
    Interrupted,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::UndefinedName => "undefined name",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::Immutable => "immutable value",
            ErrorKind::Range => "out of range",
            ErrorKind::Arity => "wrong number of arguments",
            ErrorKind::RecursionLimit => "recursion limit",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Other => "error",
        };
        f.write_str(label)
    }
}

/// Error raised by the interpreter, carried inside `anyhow::Error`.
#[derive(Debug, Clone, PartialEq)]
pub struct VexError {
    pub kind: ErrorKind,
    pub message: String,
}

impl VexError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for VexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for VexError {}

/// Kind of an arbitrary error; foreign errors map to [`ErrorKind::Other`].
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    err.downcast_ref::<VexError>().map(|e| e.kind).unwrap_or(ErrorKind::Other)
}

#[inline]
pub fn fail<T>(kind: ErrorKind, message: impl Into<String>) -> Result<T> {
    Err(VexError::new(kind, message).into())
}

pub fn err_syntax<T>(message: impl Into<String>) -> Result<T> {
    fail(ErrorKind::Syntax, message)
}

pub fn err_undefined<T>(message: impl Into<String>) -> Result<T> {
    fail(ErrorKind::UndefinedName, message)
}

pub fn err_type<T>(message: impl Into<String>) -> Result<T> {
    fail(ErrorKind::TypeMismatch, message)
}

pub fn err_immutable<T>(message: impl Into<String>) -> Result<T> {
    fail(ErrorKind::Immutable, message)
}

pub fn err_range<T>(message: impl Into<String>) -> Result<T> {
    fail(ErrorKind::Range, message)
}

pub fn err_arity<T>(message: impl Into<String>) -> Result<T> {
    fail(ErrorKind::Arity, message)
}

pub fn err_recursion<T>(message: impl Into<String>) -> Result<T> {
    fail(ErrorKind::RecursionLimit, message)
}

pub fn err_interrupted<T>() -> Result<T> {
    fail(ErrorKind::Interrupted, "Interrupted")
}

pub fn err_other<T>(message: impl Into<String>) -> Result<T> {
    fail(ErrorKind::Other, message)
}
