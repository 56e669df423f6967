use std::fmt::Write;

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::DiagnosticLevel;

/// The line of IDL source a diagnostic points at, with the underlined byte range.
///
/// Constructs spanning more than one line (an `if` with its body, a whole function) are
/// underlined up to the end of their first line.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CodeSpan {
    /// 1-based.
    line_number: usize,
    line: String,
    /// Byte offset of the underline inside `line`.
    column: usize,
    width: usize,
}

impl CodeSpan {
    /// The span of bytes `start..end` of `source`, `None` if `start` is not inside it.
    pub fn new(source: &str, start: usize, end: usize) -> Option<Self> {
        if start > source.len() {
            return None;
        }
        let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[start..]
            .find('\n')
            .map_or(source.len(), |i| start + i);
        let line = source.get(line_start..line_end)?;
        Some(CodeSpan {
            line_number: source[..line_start].matches('\n').count() + 1,
            line: line.trim_end_matches('\r').to_string(),
            column: start - line_start,
            width: end.min(line_end).saturating_sub(start),
        })
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The underlined text.
    pub fn as_str(&self) -> &str {
        let end = (self.column + self.width).min(self.line.len());
        self.line.get(self.column..end).unwrap_or("")
    }

    /// Render the line with a gutter and the underline in the color of `level`.
    pub fn render(&self, level: DiagnosticLevel) -> String {
        let number = self.line_number.to_string();
        let gutter = " ".repeat(number.len());
        let underline = "^".repeat(self.width.max(1));
        let mut out = String::new();
        let _ = writeln!(out, "{} {}", gutter, "|".blue().bold());
        let _ = writeln!(out, "{} {} {}", number.blue().bold(), "|".blue().bold(), self.line);
        let _ = writeln!(
            out,
            "{} {} {}{}",
            gutter,
            "|".blue().bold(),
            " ".repeat(self.column),
            underline.color(level.color()).bold()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outside_of_source() {
        assert!(CodeSpan::new("", 3, 4).is_none());
    }

    #[test]
    fn test_first_line() {
        let span = CodeSpan::new("Bits<32> x = 5;", 9, 10).unwrap();
        assert_eq!(span.line_number(), 1);
        assert_eq!(span.as_str(), "x");
    }

    #[test]
    fn test_later_line() {
        let span = CodeSpan::new("XReg a;\nX[rd] = a;\n", 8, 13).unwrap();
        assert_eq!(span.line_number(), 2);
        assert_eq!(span.as_str(), "X[rd]");
    }

    #[test]
    fn test_multiline_is_clipped() {
        let source = "if (a) {\n  b = 1;\n}\n";
        let span = CodeSpan::new(source, 0, source.len()).unwrap();
        assert_eq!(span.line_number(), 1);
        assert_eq!(span.as_str(), "if (a) {");
    }

    #[test]
    fn test_render_underlines() {
        colored::control::set_override(false);
        let span = CodeSpan::new("XReg a;\nfoo<N>(x);", 8, 11).unwrap();
        let rendered = span.render(DiagnosticLevel::Error);
        assert_eq!(rendered, "  |\n2 | foo<N>(x);\n  | ^^^\n");
    }
}
