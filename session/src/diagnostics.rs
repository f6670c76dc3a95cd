//! The installed diagnostics of one revision.

use std::collections::HashMap;

use modelsmith_types::{Diagnostic, DiagnosticCounts, DiagnosticId, Revision};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplaceError {
    #[error("diagnostics for {revision} are older than installed {installed}")]
    Stale {
        revision: Revision,
        installed: Revision,
    },
    #[error("diagnostic id `{id}` appears more than once in {revision}")]
    DuplicateId { id: DiagnosticId, revision: Revision },
}

/// Navigation position within a [`DiagnosticSet`].
///
/// A cursor is tied to the set contents it was taken from; once the set is
/// replaced the cursor no longer points anywhere and navigation restarts at
/// the first diagnostic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    epoch: u64,
    position: Option<usize>,
}

impl Cursor {
    #[must_use]
    pub fn start() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn position(&self) -> Option<usize> {
        self.position
    }
}

#[derive(Debug, Default)]
pub struct DiagnosticSet {
    revision: Revision,
    items: Vec<Diagnostic>,
    by_id: HashMap<DiagnosticId, usize>,
    counts: DiagnosticCounts,
    /// Bumped on every replace; cursors from older epochs are invalid.
    epoch: u64,
    cursor: Cursor,
}

impl DiagnosticSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `diagnostics` as the complete list for `revision`.
    ///
    /// All-or-nothing: on error the previous contents stay installed.
    pub fn replace(
        &mut self,
        revision: Revision,
        diagnostics: Vec<Diagnostic>,
    ) -> Result<DiagnosticCounts, ReplaceError> {
        if revision < self.revision {
            return Err(ReplaceError::Stale {
                revision,
                installed: self.revision,
            });
        }

        let mut by_id = HashMap::with_capacity(diagnostics.len());
        let mut counts = DiagnosticCounts::default();
        for (idx, diagnostic) in diagnostics.iter().enumerate() {
            if by_id.insert(diagnostic.id().clone(), idx).is_some() {
                return Err(ReplaceError::DuplicateId {
                    id: diagnostic.id().clone(),
                    revision,
                });
            }
            counts.record(diagnostic.severity());
        }

        self.revision = revision;
        self.items = diagnostics;
        self.by_id = by_id;
        self.counts = counts;
        self.epoch += 1;
        self.cursor = Cursor::start();
        Ok(counts)
    }

    #[must_use]
    pub fn counts(&self) -> DiagnosticCounts {
        self.counts
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.counts.errors
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.counts.warnings
    }

    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &DiagnosticId) -> Option<&Diagnostic> {
        self.by_id.get(id).map(|&idx| &self.items[idx])
    }

    /// Diagnostics in the order the server sent them.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// The diagnostic after `cursor`, wrapping to the first.
    #[must_use]
    pub fn next(&self, cursor: Cursor) -> Option<(Cursor, &Diagnostic)> {
        let idx = self.next_index(cursor)?;
        let moved = Cursor {
            epoch: self.epoch,
            position: Some(idx),
        };
        Some((moved, &self.items[idx]))
    }

    /// Step the set's own navigation cursor and return what it now points at.
    pub fn advance(&mut self) -> Option<&Diagnostic> {
        let idx = self.next_index(self.cursor)?;
        self.cursor = Cursor {
            epoch: self.epoch,
            position: Some(idx),
        };
        self.items.get(idx)
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    fn next_index(&self, cursor: Cursor) -> Option<usize> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }
        match cursor.position {
            Some(pos) if cursor.epoch == self.epoch && pos < len => Some((pos + 1) % len),
            _ => Some(0),
        }
    }
}
