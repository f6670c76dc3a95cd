//! Core domain types for modelsmith.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod diagnostic;
mod generation;
mod ids;

pub use diagnostic::{Diagnostic, DiagnosticCounts, Location, Position, Severity};
pub use generation::{Artifact, FailureKind, GenerationFailure};
pub use ids::{DiagnosticId, GenerationId, Revision};
