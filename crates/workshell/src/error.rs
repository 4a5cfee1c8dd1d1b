//! Error types for Workshell
//!
//! Errors fall in two groups:
//! - Fatal errors (`Parse*`, `ResourceLimit`, `Internal`) abort the whole run.
//! - Per-command errors (`Io`, `Execution`, `Expansion`, `Redirect`) are turned
//!   into a stderr line and a nonzero exit code by the interpreter, and the
//!   script keeps going.

use crate::limits::LimitExceeded;
use thiserror::Error;

/// Result type alias using Workshell's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Workshell error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Parse error without location info.
    #[error("parse error: {0}")]
    Parse(String),

    /// Parse error with source location information.
    #[error("parse error at line {line}, column {column}: {message}")]
    ParseAt {
        message: String,
        line: usize,
        column: usize,
    },

    /// A command failed in a way it could not report through its own result.
    #[error("execution error: {0}")]
    Execution(String),

    /// I/O error from the virtual filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Word expansion failed (bad arithmetic, bad substitution).
    #[error("expansion error: {0}")]
    Expansion(String),

    /// A redirection could not be applied.
    #[error("redirection error: {0}")]
    Redirect(String),

    /// Resource limit exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(#[from] LimitExceeded),

    /// Internal error for unexpected failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse error with source location.
    pub fn parse_at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::ParseAt {
            message: message.into(),
            line,
            column,
        }
    }

    /// Whether this error must abort the run instead of failing one command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Parse(_) | Error::ParseAt { .. } | Error::ResourceLimit(_) | Error::Internal(_)
        )
    }

    /// Message suitable for a `<cmd>: <message>` stderr line.
    ///
    /// Strips the category prefix so filesystem failures read like
    /// `No such file or directory`.
    pub fn message(&self) -> String {
        match self {
            Error::Parse(msg)
            | Error::Execution(msg)
            | Error::Expansion(msg)
            | Error::Redirect(msg)
            | Error::Internal(msg) => msg.clone(),
            Error::ParseAt { message, .. } => message.clone(),
            Error::Io(e) => e.to_string(),
            Error::ResourceLimit(e) => e.to_string(),
        }
    }

    /// Source line of a parse error, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::ParseAt { line, .. } => Some(*line),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_io_message_has_no_prefix() {
        let err: Error =
            std::io::Error::new(ErrorKind::NotFound, "No such file or directory").into();
        assert_eq!(err.message(), "No such file or directory");
        assert_eq!(err.to_string(), "io error: No such file or directory");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_parse_at_is_fatal_with_line() {
        let err = Error::parse_at("expected 'fi'", 3, 1);
        assert!(err.is_fatal());
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.message(), "expected 'fi'");
    }

    #[test]
    fn test_limit_is_fatal() {
        let err: Error = LimitExceeded::MaxCommands(5).into();
        assert!(err.is_fatal());
    }
}
