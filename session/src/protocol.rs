//! Wire messages exchanged with the engine.
//!
//! Messages are JSON objects tagged by `type`. The core only interprets
//! diagnostics pushes and generation replies; everything else the engine
//! sends fails to decode and is dropped at the transport boundary.

use serde::{Deserialize, Serialize};

use modelsmith_types::{
    Artifact, Diagnostic, DiagnosticId, FailureKind, GenerationId, Location, Revision, Severity,
};

/// Client → engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Full text of the document at `revision`.
    Update { revision: Revision, document: String },
    #[serde(rename_all = "camelCase")]
    Generate {
        id: GenerationId,
        revision: Revision,
        random_seed: u64,
    },
    Cancel { id: GenerationId },
}

impl ClientMessage {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Update { .. } => "update",
            Self::Generate { .. } => "generate",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// Engine → client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Complete diagnostic list for `revision`. Replaces, never merges.
    Diagnostics {
        revision: Revision,
        #[serde(default)]
        diagnostics: Vec<WireDiagnostic>,
    },
    /// Progress note for an in-flight generation.
    Status { id: GenerationId, message: String },
    Result {
        id: GenerationId,
        revision: Revision,
        artifact: Artifact,
    },
    Error {
        id: GenerationId,
        revision: Revision,
        kind: FailureKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WireDiagnostic {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub location: Option<Location>,
}

impl WireDiagnostic {
    pub fn into_diagnostic(self, revision: Revision) -> Diagnostic {
        Diagnostic::new(
            DiagnosticId::new(self.id),
            self.severity,
            self.message,
            self.location,
            revision,
        )
    }
}
