//! Single-flight generation requests.
//!
//! At most one request is active (Pending or Running). A request is tied to
//! the document revision it was issued for; asking again for the same
//! revision returns the existing handle, asking for a newer one cancels the
//! old request first.

use std::fmt;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use modelsmith_types::{
    Artifact, DiagnosticCounts, FailureKind, GenerationFailure, GenerationId, Revision,
};

use crate::connection::{ConnectionError, Session};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::types::{ConnectionState, GenerationConfig, GenerationPhase, SessionEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStatus {
    /// Waiting for the connection to open.
    Pending,
    Running { progress: Option<String> },
    Succeeded(Artifact),
    Failed(GenerationFailure),
    Cancelled,
}

impl GenerationStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded(_) | Self::Failed(_) | Self::Cancelled
        )
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running { .. } => "running",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    #[error("generation blocked by {errors} error(s)")]
    BlockedByErrors { errors: usize },
    #[error("no document has been submitted")]
    NoDocument,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Caller's view of one generation request.
#[derive(Debug, Clone)]
pub struct GenerationHandle {
    id: GenerationId,
    revision: Revision,
    status: watch::Receiver<GenerationStatus>,
}

impl GenerationHandle {
    #[must_use]
    pub fn id(&self) -> GenerationId {
        self.id
    }

    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    #[must_use]
    pub fn status(&self) -> GenerationStatus {
        self.status.borrow().clone()
    }

    /// Wait until the request reaches a terminal status.
    pub async fn outcome(&self) -> GenerationStatus {
        let mut status = self.status.clone();
        match status.wait_for(GenerationStatus::is_terminal).await {
            Ok(terminal) => terminal.clone(),
            // Controller went away without resolving; nothing will arrive.
            Err(_) => GenerationStatus::Cancelled,
        }
    }
}

#[derive(Debug)]
struct ActiveRequest {
    id: GenerationId,
    revision: Revision,
    random_seed: u64,
    status_tx: watch::Sender<GenerationStatus>,
    /// Generate message reached the transport.
    issued: bool,
    deadline: Option<JoinHandle<()>>,
}

impl ActiveRequest {
    fn handle(&self) -> GenerationHandle {
        GenerationHandle {
            id: self.id,
            revision: self.revision,
            status: self.status_tx.subscribe(),
        }
    }
}

#[derive(Debug)]
pub struct GenerationController {
    config: GenerationConfig,
    event_tx: mpsc::Sender<SessionEvent>,
    active: Option<ActiveRequest>,
}

impl GenerationController {
    pub(crate) fn new(config: GenerationConfig, event_tx: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            config,
            event_tx,
            active: None,
        }
    }

    /// Request generation for `revision`, the session's current document.
    pub async fn generate(
        &mut self,
        revision: Revision,
        counts: DiagnosticCounts,
        session: &mut Session,
    ) -> Result<GenerationHandle, GenerateError> {
        if counts.errors > 0 {
            return Err(GenerateError::BlockedByErrors {
                errors: counts.errors,
            });
        }
        if revision.is_zero() {
            return Err(GenerateError::NoDocument);
        }
        match session.state() {
            ConnectionState::Closed => return Err(ConnectionError::Closed.into()),
            ConnectionState::Disconnected => return Err(ConnectionError::NotConnected.into()),
            ConnectionState::Connecting | ConnectionState::Open => {}
        }

        if let Some(active) = &self.active {
            if active.revision == revision {
                tracing::debug!(id = %active.id, revision = %revision, "Generation already active");
                return Ok(active.handle());
            }
            tracing::info!(
                id = %active.id,
                revision = %active.revision,
                superseded_by = %revision,
                "Superseding generation request"
            );
            self.cancel(session).await;
        }

        let (status_tx, _) = watch::channel(GenerationStatus::Pending);
        let request = ActiveRequest {
            id: GenerationId::new_v4(),
            revision,
            random_seed: self.config.random_seed.unwrap_or_else(rand::random),
            status_tx,
            issued: false,
            deadline: None,
        };
        let handle = request.handle();
        tracing::info!(id = %request.id, revision = %revision, "Generation requested");
        self.active = Some(request);

        if session.is_open() {
            self.issue(session).await;
        }
        Ok(handle)
    }

    /// Cancel the active request, if any. Returns whether one was cancelled.
    pub async fn cancel(&mut self, session: &mut Session) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        let id = active.id;
        if active.issued {
            // Best effort: the engine may already be done.
            session.send_message(ClientMessage::Cancel { id }).await;
        }
        self.resolve(GenerationStatus::Cancelled);
        true
    }

    #[must_use]
    pub fn active(&self) -> Option<GenerationHandle> {
        self.active.as_ref().map(ActiveRequest::handle)
    }

    #[must_use]
    pub fn phase(&self, counts: DiagnosticCounts) -> GenerationPhase {
        match &self.active {
            Some(active) if active.issued => GenerationPhase::Running,
            Some(_) => GenerationPhase::Pending,
            None if counts.errors > 0 => GenerationPhase::BlockedByErrors,
            None => GenerationPhase::Idle,
        }
    }

    // ========================================================================
    // Session events
    // ========================================================================

    /// Issue a request that was waiting for the connection.
    pub(crate) async fn on_session_open(&mut self, session: &mut Session) {
        if self.active.as_ref().is_some_and(|a| !a.issued) {
            self.issue(session).await;
        }
    }

    /// A running request cannot survive its link; pending ones wait for the next.
    pub(crate) fn on_transport_dropped(&mut self) {
        if self.active.as_ref().is_some_and(|a| a.issued) {
            tracing::info!("Engine link dropped during generation");
            self.resolve(GenerationStatus::Cancelled);
        }
    }

    /// Connecting gave up or the session was torn down; nothing can be issued.
    pub(crate) fn on_session_ended(&mut self) {
        if self.active.is_some() {
            self.resolve(GenerationStatus::Cancelled);
        }
    }

    /// Apply a generation reply. Returns true when it belonged to the active request.
    pub(crate) fn on_server_message(&mut self, message: ServerMessage) -> bool {
        let (id, status) = match message {
            ServerMessage::Status { id, message } => (
                id,
                GenerationStatus::Running {
                    progress: Some(message),
                },
            ),
            ServerMessage::Result { id, artifact, .. } => (id, GenerationStatus::Succeeded(artifact)),
            ServerMessage::Error {
                id, kind, message, ..
            } => (
                id,
                GenerationStatus::Failed(GenerationFailure::new(kind, message)),
            ),
            ServerMessage::Diagnostics { .. } => return false,
        };

        let Some(active) = &self.active else {
            tracing::debug!(id = %id, "Ignoring reply with no active generation");
            return false;
        };
        if active.id != id || !active.issued {
            tracing::debug!(id = %id, active = %active.id, "Ignoring reply for superseded generation");
            return false;
        }

        if status.is_terminal() {
            tracing::info!(id = %id, status = %status, "Generation finished");
            self.resolve(status);
        } else {
            active.status_tx.send_replace(status);
        }
        true
    }

    pub(crate) async fn on_timeout(&mut self, id: GenerationId, session: &mut Session) {
        if self.active.as_ref().is_none_or(|a| a.id != id) {
            return;
        }
        tracing::warn!(id = %id, timeout_secs = self.config.timeout_secs, "Generation timed out");
        session.send_message(ClientMessage::Cancel { id }).await;
        self.resolve(GenerationStatus::Failed(GenerationFailure::new(
            FailureKind::Timeout,
            format!("no reply within {}s", self.config.timeout_secs),
        )));
    }

    async fn issue(&mut self, session: &mut Session) {
        let Some(active) = &mut self.active else {
            return;
        };
        let message = ClientMessage::Generate {
            id: active.id,
            revision: active.revision,
            random_seed: active.random_seed,
        };
        if !session.send_message(message).await {
            // Stays pending; the next open retries.
            return;
        }

        active.issued = true;
        active.status_tx.send_replace(GenerationStatus::Running { progress: None });
        tracing::debug!(id = %active.id, revision = %active.revision, "Generation issued");

        let id = active.id;
        let timeout = self.config.timeout();
        let event_tx = self.event_tx.clone();
        active.deadline = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = event_tx.send(SessionEvent::GenerationTimedOut { id }).await;
        }));
    }

    /// Publish a terminal status and forget the request.
    fn resolve(&mut self, status: GenerationStatus) {
        if let Some(active) = self.active.take() {
            if let Some(deadline) = active.deadline {
                deadline.abort();
            }
            active.status_tx.send_replace(status);
        }
    }
}

impl Drop for GenerationController {
    fn drop(&mut self) {
        self.resolve(GenerationStatus::Cancelled);
    }
}
