//! Diagnostics reported by the remote validator.

use std::fmt;

use crate::ids::{DiagnosticId, Revision};

/// Severity level for a diagnostic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 0-indexed position in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Half-open source range a diagnostic points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

impl Location {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A single diagnostic for one document revision.
///
/// Fields are private: a diagnostic is immutable once built, and a newer
/// revision replaces it rather than editing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    id: DiagnosticId,
    severity: Severity,
    message: String,
    location: Option<Location>,
    revision: Revision,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        id: DiagnosticId,
        severity: Severity,
        message: String,
        location: Option<Location>,
        revision: Revision,
    ) -> Self {
        Self {
            id,
            severity,
            message,
            location,
            revision,
        }
    }

    #[must_use]
    pub fn id(&self) -> &DiagnosticId {
        &self.id
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Format as `line:col: severity: message` (1-indexed for display).
    #[must_use]
    pub fn display_line(&self) -> String {
        match &self.location {
            Some(loc) => format!(
                "{}:{}: {}: {}",
                u64::from(loc.start.line) + 1,
                u64::from(loc.start.column) + 1,
                self.severity.label(),
                self.message,
            ),
            None => format!("{}: {}", self.severity.label(), self.message),
        }
    }
}

/// Per-severity tallies of an installed diagnostic list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticCounts {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl DiagnosticCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Info => self.infos += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.errors + self.warnings + self.infos
    }

    /// No errors. Warnings do not block generation.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }

    /// Human summary such as `"2 errors and 1 warning"`.
    ///
    /// Empty when there are neither errors nor warnings.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if self.errors > 0 {
            parts.push(plural(self.errors, "error"));
        }
        if self.warnings > 0 {
            parts.push(plural(self.warnings, "warning"));
        }
        parts.join(" and ")
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
