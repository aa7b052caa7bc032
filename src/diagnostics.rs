//! Compilation diagnostics: errors and warnings with source positions.
//!
//! Stages report problems through [`Diagnostic`] records collected in a
//! [`Diagnostics`] report. User errors are accumulated so a single run
//! can surface multiple problems; the driver checks `has_errors()`
//! between stages to decide whether to continue.

use serde::Serialize;
use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fails the build.
    Error,
    /// Reported but does not fail the build.
    Warning,
}

/// Diagnostic taxonomy.
///
/// Kinds 1-4 (tokenizer through merge) are user errors and may be
/// accumulated; finalization errors abort immediately; `Internal`
/// indicates a compiler bug and maps to exit code 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Tokenizer,
    Parse,
    Semantic,
    Merge,
    Finalization,
    Cancelled,
    Internal,
}

impl DiagnosticKind {
    /// Human-readable label used in `file:line:col: kind: text` output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            DiagnosticKind::Tokenizer => "tokenizer error",
            DiagnosticKind::Parse => "parse error",
            DiagnosticKind::Semantic => "semantic error",
            DiagnosticKind::Merge => "merge error",
            DiagnosticKind::Finalization => "finalization error",
            DiagnosticKind::Cancelled => "cancelled",
            DiagnosticKind::Internal => "internal error",
        }
    }

    /// Process exit code associated with this kind of error.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            DiagnosticKind::Internal => 2,
            _ => 1,
        }
    }
}

/// Source location of a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

/// A single error or warning.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub source: Option<SourceRef>,
    pub message: String,
    /// Short source excerpt displayed under the message.
    pub excerpt: Option<String>,
}

impl Diagnostic {
    /// Creates a new error diagnostic.
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            source: None,
            message: message.into(),
            excerpt: None,
        }
    }

    /// Creates a new warning diagnostic.
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            source: None,
            message: message.into(),
            excerpt: None,
        }
    }

    /// Attaches a source position.
    #[must_use]
    pub fn at(mut self, file: impl Into<String>, line: u32, col: u32) -> Self {
        self.source = Some(SourceRef {
            file: file.into(),
            line,
            col,
        });
        self
    }

    /// Attaches a source excerpt.
    #[must_use]
    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}:{}:{}: ", source.file, source.line, source.col)?;
        }

        let label = match self.severity {
            Severity::Error => self.kind.label(),
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", label, self.message)?;

        if let Some(excerpt) = &self.excerpt {
            write!(f, "\n    | {excerpt}")?;
        }

        Ok(())
    }
}

/// Accumulated diagnostics for a compilation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a diagnostic to the report.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Absorbs another report.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Returns true if any entry is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Number of errors in the report.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Number of warnings in the report.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// Iterates over all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Exit code for the worst error in the report (0 when clean).
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.kind.exit_code())
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display_with_position() {
        let diag = Diagnostic::error(DiagnosticKind::Parse, "unexpected token").at("map.kll", 3, 7);
        assert_eq!(diag.to_string(), "map.kll:3:7: parse error: unexpected token");
    }

    #[test]
    fn test_warning_display() {
        let diag =
            Diagnostic::warning(DiagnosticKind::Semantic, "shadowed mapping").at("map.kll", 1, 1);
        assert_eq!(diag.to_string(), "map.kll:1:1: warning: shadowed mapping");
    }

    #[test]
    fn test_report_counts() {
        let mut report = Diagnostics::new();
        assert!(!report.has_errors());
        assert_eq!(report.exit_code(), 0);

        report.push(Diagnostic::warning(DiagnosticKind::Merge, "isolated"));
        assert!(!report.has_errors());

        report.push(Diagnostic::error(DiagnosticKind::Parse, "bad"));
        assert!(report.has_errors());
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.warning_count(), 1);
        assert_eq!(report.exit_code(), 1);

        report.push(Diagnostic::error(DiagnosticKind::Internal, "bug"));
        assert_eq!(report.exit_code(), 2);
    }
}
