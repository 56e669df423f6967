//! Errors and warnings about IDL sources, as reported to the user.
//!
//! Compile units running under the same compiler share one [`DiagnosticContext`]; every type
//! error and warning they produce is appended to it, so that the caller can print them all at the
//! end of the run.

mod span;

use std::fmt::{Display, Formatter};

use colored::{Color, Colorize};
use serde::{Deserialize, Serialize};

pub use span::CodeSpan;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

impl DiagnosticLevel {
    pub fn color(&self) -> Color {
        match self {
            DiagnosticLevel::Warning => Color::Yellow,
            DiagnosticLevel::Error => Color::Red,
        }
    }
}

impl Display for DiagnosticLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticLevel::Warning => f.write_str("warning"),
            DiagnosticLevel::Error => f.write_str("error"),
        }
    }
}

/// A file and a 1-based line in it. Code not read from a file has a synthetic name, like
/// `tests::body` or the name of the instruction whose operation it is.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    level: DiagnosticLevel,
    message: String,
    location: Option<SourceLocation>,
    snippet: Option<CodeSpan>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Warning, message)
    }

    fn with_level(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Diagnostic {
            level,
            message: message.into(),
            location: None,
            snippet: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: usize) -> Self {
        self.location = Some(SourceLocation {
            file: file.into(),
            line,
        });
        self
    }

    /// Attach the offending source line. Its line number replaces the one given with
    /// [`Diagnostic::at`].
    pub fn with_snippet(mut self, snippet: CodeSpan) -> Self {
        if let Some(location) = &mut self.location {
            location.line = snippet.line_number();
        }
        self.snippet = Some(snippet);
        self
    }

    pub fn level(&self) -> DiagnosticLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub fn snippet(&self) -> Option<&CodeSpan> {
        self.snippet.as_ref()
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{}: ", location.to_string().bold())?;
        }
        writeln!(
            f,
            "{}: {}",
            self.level.to_string().color(self.level.color()).bold(),
            self.message
        )?;
        if let Some(snippet) = &self.snippet {
            write!(f, "{}", snippet.render(self.level))?;
        }
        Ok(())
    }
}

/// The diagnostics of a run, in the order they were emitted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiagnosticContext {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn with_level(&self, level: DiagnosticLevel) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.level == level)
    }

    pub fn has_errors(&self) -> bool {
        self.with_level(DiagnosticLevel::Error).next().is_some()
    }

    /// Remove the accumulated diagnostics, returning them.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}
