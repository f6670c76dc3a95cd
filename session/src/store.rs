//! SessionStore facade: the state presentation code reads and drives.
//!
//! Composes the session, the validation stream and the generation
//! controller. Background tasks report through one event channel; the owner
//! drains it with [`SessionStore::poll_events`] or awaits
//! [`SessionStore::process_next_event`]. All mutation goes through
//! `&mut self`, so events and caller actions are applied one at a time.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use modelsmith_types::{Diagnostic, DiagnosticCounts, Revision};

use crate::connection::{ConnectionError, SendOutcome, Session};
use crate::diagnostics::DiagnosticSet;
use crate::generation::{GenerateError, GenerationController, GenerationHandle};
use crate::protocol::ServerMessage;
use crate::transport::Transport;
use crate::types::{ConnectionState, SessionConfig, SessionEvent, StoreSnapshot};
use crate::validation::{ValidationOutcome, ValidationStream};

/// Channel capacity for events from background tasks to the store.
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct SessionStore {
    session: Session,
    validation: ValidationStream,
    generation: GenerationController,
    event_rx: mpsc::Receiver<SessionEvent>,
    snapshot_tx: watch::Sender<StoreSnapshot>,
}

impl SessionStore {
    /// Build a store around `transport`. Nothing connects until [`open`](Self::open).
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = Session::new(transport, &config.connection, event_tx.clone());
        let generation = GenerationController::new(config.generation, event_tx);
        let validation = ValidationStream::new();
        let (snapshot_tx, _) = watch::channel(StoreSnapshot {
            state: session.state(),
            revision: session.current_revision(),
            diagnostics_revision: Revision::ZERO,
            counts: DiagnosticCounts::default(),
            generation: generation.phase(DiagnosticCounts::default()),
            last_connection_error: None,
        });
        Self {
            session,
            validation,
            generation,
            event_rx,
            snapshot_tx,
        }
    }

    pub fn open(&mut self) -> Result<(), ConnectionError> {
        let result = self.session.open();
        self.publish();
        result
    }

    /// Submit the full document text as the next revision.
    pub async fn edit(
        &mut self,
        document: impl Into<Arc<str>>,
    ) -> Result<(Revision, SendOutcome), ConnectionError> {
        let result = self.session.submit(document).await;
        self.publish();
        result
    }

    /// Request generation for the current revision.
    ///
    /// Refused with [`GenerateError::BlockedByErrors`] while the installed
    /// diagnostics contain errors; use [`next_diagnostic`](Self::next_diagnostic)
    /// to walk them instead.
    pub async fn generate(&mut self) -> Result<GenerationHandle, GenerateError> {
        let revision = self.session.current_revision();
        let counts = self.validation.counts();
        let result = self
            .generation
            .generate(revision, counts, &mut self.session)
            .await;
        self.publish();
        result
    }

    pub async fn cancel_generation(&mut self) -> bool {
        let cancelled = self.generation.cancel(&mut self.session).await;
        self.publish();
        cancelled
    }

    /// Step through the installed diagnostics, wrapping after the last.
    pub fn next_diagnostic(&mut self) -> Option<&Diagnostic> {
        self.validation.diagnostics_mut().advance()
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
        self.generation.on_session_ended();
        self.publish();
    }

    /// Tear the session down for good.
    pub fn close(&mut self) {
        self.session.close();
        self.generation.on_session_ended();
        self.publish();
    }

    // ========================================================================
    // Observable state
    // ========================================================================

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.validation.diagnostics().error_count()
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.validation.diagnostics().warning_count()
    }

    #[must_use]
    pub fn counts(&self) -> DiagnosticCounts {
        self.validation.counts()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    #[must_use]
    pub fn current_revision(&self) -> Revision {
        self.session.current_revision()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticSet {
        self.validation.diagnostics()
    }

    /// Why the last connect cycle gave up, until the next successful open.
    #[must_use]
    pub fn last_connection_error(&self) -> Option<&ConnectionError> {
        self.session.last_error()
    }

    #[must_use]
    pub fn active_generation(&self) -> Option<GenerationHandle> {
        self.generation.active()
    }

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            state: self.session.state(),
            revision: self.session.current_revision(),
            diagnostics_revision: self.validation.diagnostics().revision(),
            counts: self.validation.counts(),
            generation: self.generation.phase(self.validation.counts()),
            last_connection_error: self.session.last_error().cloned(),
        }
    }

    /// Receiver that observes every change to [`snapshot`](Self::snapshot).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot_tx.subscribe()
    }

    // ========================================================================
    // Event processing
    // ========================================================================

    /// Apply pending events from background tasks, up to `budget`.
    ///
    /// Non-blocking: returns as soon as the channel is empty.
    pub async fn poll_events(&mut self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event).await;
                    count += 1;
                }
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        count
    }

    /// Wait for the next event and apply it. Returns false if no more can arrive.
    pub async fn process_next_event(&mut self) -> bool {
        match self.event_rx.recv().await {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { epoch, outbound } => {
                if self.session.handle_connected(epoch, outbound).await {
                    self.generation.on_session_open(&mut self.session).await;
                }
            }
            SessionEvent::ConnectFailed { epoch, error } => {
                if self.session.handle_connect_failed(epoch, error) {
                    self.generation.on_session_ended();
                }
            }
            SessionEvent::Message { epoch, message } => {
                if self.session.accepts(epoch) {
                    self.handle_message(message);
                } else {
                    tracing::debug!(epoch, "Dropping message from abandoned link");
                }
            }
            SessionEvent::Dropped { epoch } => {
                if self.session.handle_dropped(epoch) {
                    self.generation.on_transport_dropped();
                }
            }
            SessionEvent::GenerationTimedOut { id } => {
                self.generation.on_timeout(id, &mut self.session).await;
            }
        }
        self.publish();
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Diagnostics {
                revision,
                diagnostics,
            } => {
                let sent = self.session.current_revision();
                if revision > sent {
                    tracing::warn!(
                        revision = %revision,
                        sent = %sent,
                        "Dropping diagnostics for a revision never sent"
                    );
                    return;
                }
                if let ValidationOutcome::Applied(counts) =
                    self.validation.apply(revision, diagnostics)
                {
                    tracing::info!(
                        revision = %revision,
                        errors = counts.errors,
                        warnings = counts.warnings,
                        "Diagnostics updated"
                    );
                }
            }
            other => {
                self.generation.on_server_message(other);
            }
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
