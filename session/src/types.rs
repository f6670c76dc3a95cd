//! Public configuration and state types.
//!
//! The presentation layer constructs a [`SessionConfig`] (usually via
//! `modelsmith-config`) and reads [`StoreSnapshot`]s; [`SessionEvent`] is the
//! internal message type background tasks use to reach the store.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;

use modelsmith_types::{DiagnosticCounts, GenerationId, Revision};

use crate::connection::ConnectionError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::retry::RetryConfig;

/// Connection and reconnect behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Retries after the first failed connect attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    /// Ceiling for the exponential backoff.
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
    /// Document updates held while connecting; the oldest is dropped on overflow.
    pub send_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            jitter_factor: retry.jitter_factor,
            send_queue_capacity: 8,
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
            jitter_factor: if self.jitter_factor.is_finite() {
                self.jitter_factor.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    /// A zero capacity would make every update while connecting vanish.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.send_queue_capacity.max(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Deadline for one generation request. Default: 600.
    pub timeout_secs: u64,
    /// Fixed seed forwarded to the engine; a fresh random seed per request when unset.
    pub random_seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            random_seed: None,
        }
    }
}

impl GenerationConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
    pub generation: GenerationConfig,
}

/// Lifecycle of the engine connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Torn down for good; `open()` is refused.
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the generate control should offer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    Idle,
    /// Requested but not yet sent (connection not open).
    Pending,
    Running,
    BlockedByErrors,
}

/// Observable state for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub state: ConnectionState,
    /// Latest revision submitted by the client.
    pub revision: Revision,
    /// Revision the installed diagnostics belong to.
    pub diagnostics_revision: Revision,
    pub counts: DiagnosticCounts,
    pub generation: GenerationPhase,
    pub last_connection_error: Option<ConnectionError>,
}

impl StoreSnapshot {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Label for a generate control, e.g. `"Generate (1 warning)"`.
    ///
    /// With `hide_warnings` only errors are summarised.
    #[must_use]
    pub fn generate_label(&self, hide_warnings: bool) -> String {
        let shown = DiagnosticCounts {
            warnings: if hide_warnings { 0 } else { self.counts.warnings },
            ..self.counts
        };
        let summary = shown.summary();
        if shown.errors > 0 {
            summary
        } else if summary.is_empty() {
            "Generate".to_string()
        } else {
            format!("Generate ({summary})")
        }
    }
}

/// Messages from background tasks to the store.
///
/// Every connection-scoped event carries the epoch of the connect cycle that
/// produced it, so events from an abandoned link can be recognised.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Connected {
        epoch: u64,
        outbound: mpsc::Sender<ClientMessage>,
    },
    ConnectFailed {
        epoch: u64,
        error: ConnectionError,
    },
    Message {
        epoch: u64,
        message: ServerMessage,
    },
    Dropped {
        epoch: u64,
    },
    GenerationTimedOut {
        id: GenerationId,
    },
}
