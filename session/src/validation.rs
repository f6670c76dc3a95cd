//! Applies engine diagnostics pushes to the installed set.

use modelsmith_types::{Diagnostic, DiagnosticCounts, Revision};

use crate::diagnostics::{DiagnosticSet, ReplaceError};
use crate::protocol::WireDiagnostic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Applied(DiagnosticCounts),
    /// Not newer than what is installed; dropped.
    Stale { revision: Revision, installed: Revision },
    /// Malformed push; the previous set stays installed.
    Rejected(ReplaceError),
}

#[derive(Debug, Default)]
pub struct ValidationStream {
    diagnostics: DiagnosticSet,
    last_applied: Option<Revision>,
}

impl ValidationStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the diagnostics the engine reported for `revision`.
    ///
    /// Pushes not newer than the last applied revision are dropped, so a
    /// late reply can never overwrite fresher results.
    pub fn apply(&mut self, revision: Revision, wire: Vec<WireDiagnostic>) -> ValidationOutcome {
        if let Some(installed) = self.last_applied
            && revision <= installed
        {
            tracing::debug!(
                revision = %revision,
                installed = %installed,
                "Dropping stale diagnostics"
            );
            return ValidationOutcome::Stale {
                revision,
                installed,
            };
        }

        let diagnostics: Vec<Diagnostic> = wire
            .into_iter()
            .map(|d| d.into_diagnostic(revision))
            .collect();
        match self.diagnostics.replace(revision, diagnostics) {
            Ok(counts) => {
                self.last_applied = Some(revision);
                tracing::debug!(
                    revision = %revision,
                    errors = counts.errors,
                    warnings = counts.warnings,
                    infos = counts.infos,
                    "Installed diagnostics"
                );
                ValidationOutcome::Applied(counts)
            }
            Err(ReplaceError::Stale {
                revision,
                installed,
            }) => ValidationOutcome::Stale {
                revision,
                installed,
            },
            Err(e) => {
                tracing::warn!("Rejected diagnostics push: {e}");
                ValidationOutcome::Rejected(e)
            }
        }
    }

    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticSet {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut DiagnosticSet {
        &mut self.diagnostics
    }

    #[must_use]
    pub fn last_applied(&self) -> Option<Revision> {
        self.last_applied
    }

    #[must_use]
    pub fn counts(&self) -> DiagnosticCounts {
        self.diagnostics.counts()
    }
}
