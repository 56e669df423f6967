//! The three kinds of failures of the compiler.
//!
//! - [`TypeError`]: the IDL source is wrong. Aborts the current compile unit.
//! - [`InternalError`]: the compiler is wrong. Always fatal.
//! - [`ValueError`]: a value is not known at compile time. Expected, and handled by whoever can
//!   proceed without the value.

use std::backtrace::Backtrace;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use idl_diagnostics::{CodeSpan, Diagnostic};
use thiserror::Error;

use crate::ast::Loc;

/// A semantic error in the IDL source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{loc}: {message}")]
pub struct TypeError {
    pub message: String,
    pub loc: Loc,
}

impl TypeError {
    pub fn new(loc: &Loc, message: impl Into<String>) -> Self {
        TypeError {
            message: message.into(),
            loc: loc.clone(),
        }
    }

    /// Build a diagnostic for this error, pointing at the offending source when it is available.
    pub fn to_diagnostic(&self, source: Option<&str>) -> Diagnostic {
        let diagnostic =
            Diagnostic::error(self.message.clone()).at(&*self.loc.file, self.loc.line as usize);
        match source.and_then(|source| CodeSpan::new(source, self.loc.start, self.loc.end)) {
            Some(snippet) => diagnostic.with_snippet(snippet),
            None => diagnostic,
        }
    }
}

/// A defect of the compiler itself: some contract between its parts was violated.
#[derive(Clone, Error)]
#[error("internal compiler error: {message}")]
pub struct InternalError {
    pub message: String,
    trace: Arc<Backtrace>,
}

impl InternalError {
    pub fn new(message: impl Into<String>) -> Self {
        InternalError {
            message: message.into(),
            trace: Arc::new(Backtrace::capture()),
        }
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.trace
    }
}

impl Debug for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "InternalError({:?})\n{}", self.message, self.trace)
    }
}

/// A value is not known at compile time.
#[derive(Debug, Clone, Error)]
pub enum ValueError {
    #[error("value not known at compile time: {0}")]
    Unknown(String),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl ValueError {
    pub fn unknown(reason: impl Into<String>) -> Self {
        ValueError::Unknown(reason.into())
    }
}

/// Errors that abort a compile unit.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Internal(#[from] InternalError),
    #[error("{file}:{line}: syntax error: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
    #[error("Cannot read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// The type error, if this is one.
    pub fn as_type_error(&self) -> Option<&TypeError> {
        match self {
            CompileError::Type(e) => Some(e),
            _ => None,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

pub type ValueResult<T> = Result<T, ValueError>;

/// Catch the "not known" case of a [`ValueResult`], keeping internal errors.
pub trait ValueResultExt<T> {
    /// `Ok(Some(v))` if known, `Ok(None)` if not known at compile time.
    fn known(self) -> Result<Option<T>, InternalError>;
}

impl<T> ValueResultExt<T> for ValueResult<T> {
    fn known(self) -> Result<Option<T>, InternalError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(ValueError::Unknown(reason)) => {
                trace!("value not known: {}", reason);
                Ok(None)
            }
            Err(ValueError::Internal(e)) => Err(e),
        }
    }
}

impl From<ValueError> for CompileError {
    /// Only used where a value is required by the language (e.g. a template argument); callers
    /// turn the "not known" case into a [`TypeError`] before reaching here.
    fn from(error: ValueError) -> Self {
        match error {
            ValueError::Unknown(reason) => CompileError::Internal(InternalError::new(format!(
                "unhandled unknown value: {}",
                reason
            ))),
            ValueError::Internal(e) => CompileError::Internal(e),
        }
    }
}

impl Display for Loc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Return early with a [`TypeError`] at the given location.
#[macro_export]
macro_rules! bail_type {
    ($loc:expr, $($arg:tt)*) => {
        return Err($crate::error::TypeError::new($loc, format!($($arg)*)).into())
    };
}

/// Return early with a [`ValueError::Unknown`].
#[macro_export]
macro_rules! bail_unknown {
    ($($arg:tt)*) => {
        return Err($crate::error::ValueError::unknown(format!($($arg)*)).into())
    };
}

/// Return early with an [`InternalError`].
#[macro_export]
macro_rules! bail_internal {
    ($($arg:tt)*) => {
        return Err($crate::error::InternalError::new(format!($($arg)*)).into())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_catches_unknown_only() {
        let unknown: ValueResult<u32> = Err(ValueError::unknown("rs1"));
        assert!(matches!(unknown.known(), Ok(None)));
        let known: ValueResult<u32> = Ok(3);
        assert!(matches!(known.known(), Ok(Some(3))));
        let internal: ValueResult<u32> = Err(InternalError::new("boom").into());
        assert!(internal.known().is_err());
    }

    #[test]
    fn test_type_error_diagnostic_span() {
        let source = "Bits<32> x = 5;\nx = true;\n";
        let loc = Loc::new("isa.idl", 2, 16, 25);
        let error = TypeError::new(&loc, "cannot assign Boolean to Bits<32>");
        assert_eq!(
            error.to_string(),
            "isa.idl:2: cannot assign Boolean to Bits<32>"
        );
        let diagnostic = error.to_diagnostic(Some(source));
        assert_eq!(diagnostic.message(), "cannot assign Boolean to Bits<32>");
        colored::control::set_override(false);
        assert!(diagnostic.to_string().contains("2 | x = true;"));
    }
}
