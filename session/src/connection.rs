//! Connection lifecycle around a [`Transport`].
//!
//! ```text
//! Disconnected ──open()──▶ Connecting ──connected──▶ Open
//!       ▲                     │   ▲                   │
//!       └──retries exhausted──┘   └────link dropped───┘
//!
//! any state ──disconnect()──▶ Disconnected      any state ──close()──▶ Closed (terminal)
//! ```
//!
//! Connecting happens in a background task that reports back through the
//! store's event channel. Each connect cycle gets a fresh epoch; events
//! carrying an older epoch belong to an abandoned link and are ignored.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use modelsmith_types::Revision;

use crate::protocol::ClientMessage;
use crate::retry::RetryConfig;
use crate::transport::{Link, Transport};
use crate::types::{ConnectionConfig, ConnectionState, SessionEvent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("engine unreachable after {attempts} attempt(s): {message}")]
    Unreachable { attempts: u32, message: String },
    #[error("session is closed")]
    Closed,
    #[error("session is not connected")]
    NotConnected,
}

/// What happened to a document update handed to [`Session::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Held until the connection opens.
    Queued,
    /// Not connected and not connecting; remembered for the next `open()`.
    Deferred,
    /// Revision not newer than the current one; ignored.
    Stale,
}

#[derive(Debug, Clone)]
struct DocumentUpdate {
    revision: Revision,
    document: Arc<str>,
}

impl DocumentUpdate {
    fn to_message(&self) -> ClientMessage {
        ClientMessage::Update {
            revision: self.revision,
            document: self.document.to_string(),
        }
    }
}

pub struct Session {
    state: ConnectionState,
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
    queue_capacity: usize,
    event_tx: mpsc::Sender<SessionEvent>,
    epoch: u64,
    outbound: Option<mpsc::Sender<ClientMessage>>,
    /// Updates issued while connecting, oldest first.
    pending: VecDeque<DocumentUpdate>,
    /// Newest update ever issued; resent after every reconnect.
    latest: Option<DocumentUpdate>,
    current_revision: Revision,
    last_error: Option<ConnectionError>,
    connect_task: Option<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: &ConnectionConfig,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            transport,
            retry: config.retry(),
            queue_capacity: config.queue_capacity(),
            event_tx,
            epoch: 0,
            outbound: None,
            pending: VecDeque::new(),
            latest: None,
            current_revision: Revision::ZERO,
            last_error: None,
            connect_task: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    #[must_use]
    pub fn current_revision(&self) -> Revision {
        self.current_revision
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn pending_updates(&self) -> usize {
        self.pending.len()
    }

    /// Start connecting. Returns immediately; the outcome arrives as an event.
    pub fn open(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Closed => Err(ConnectionError::Closed),
            ConnectionState::Open | ConnectionState::Connecting => Ok(()),
            ConnectionState::Disconnected => {
                self.last_error = None;
                self.begin_connect();
                Ok(())
            }
        }
    }

    /// Allocate the next revision for `document` and send it.
    pub async fn submit(
        &mut self,
        document: impl Into<Arc<str>>,
    ) -> Result<(Revision, SendOutcome), ConnectionError> {
        let revision = self.current_revision.next();
        let outcome = self.send(revision, document).await?;
        Ok((revision, outcome))
    }

    pub async fn send(
        &mut self,
        revision: Revision,
        document: impl Into<Arc<str>>,
    ) -> Result<SendOutcome, ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::Closed);
        }
        if revision <= self.current_revision {
            tracing::debug!(
                revision = %revision,
                current = %self.current_revision,
                "Ignoring stale document update"
            );
            return Ok(SendOutcome::Stale);
        }

        let update = DocumentUpdate {
            revision,
            document: document.into(),
        };
        self.current_revision = revision;
        self.latest = Some(update.clone());

        match self.state {
            ConnectionState::Open => {
                if self.deliver(update.to_message()).await {
                    Ok(SendOutcome::Sent)
                } else {
                    // Link went away under us; the drop event will follow.
                    self.enqueue(update);
                    Ok(SendOutcome::Queued)
                }
            }
            ConnectionState::Connecting => {
                self.enqueue(update);
                Ok(SendOutcome::Queued)
            }
            ConnectionState::Disconnected | ConnectionState::Closed => Ok(SendOutcome::Deferred),
        }
    }

    /// Send a non-document message. Only possible while open.
    pub(crate) async fn send_message(&mut self, message: ClientMessage) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        self.deliver(message).await
    }

    async fn deliver(&mut self, message: ClientMessage) -> bool {
        let Some(outbound) = &self.outbound else {
            return false;
        };
        let kind = message.kind();
        if outbound.send(message).await.is_err() {
            tracing::debug!(epoch = self.epoch, kind, "Outbound link closed");
            self.outbound = None;
            return false;
        }
        true
    }

    fn enqueue(&mut self, update: DocumentUpdate) {
        if self.pending.len() >= self.queue_capacity
            && let Some(dropped) = self.pending.pop_front()
        {
            tracing::debug!(
                revision = %dropped.revision,
                "Send queue full, dropping oldest pending update"
            );
        }
        self.pending.push_back(update);
    }

    /// Whether an event from `epoch` belongs to the live link.
    #[must_use]
    pub(crate) fn accepts(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.state == ConnectionState::Open
    }

    /// Returns true when the session transitioned to `Open`.
    pub(crate) async fn handle_connected(
        &mut self,
        epoch: u64,
        outbound: mpsc::Sender<ClientMessage>,
    ) -> bool {
        if epoch != self.epoch || self.state != ConnectionState::Connecting {
            tracing::debug!(epoch, current = self.epoch, "Discarding stale connection");
            return false;
        }
        tracing::info!(epoch, peer = %self.transport.describe(), "Session open");
        self.state = ConnectionState::Open;
        self.outbound = Some(outbound);
        self.last_error = None;
        self.resync().await;
        true
    }

    /// Flush queued updates, or resend the newest one so the engine
    /// validates what the client is looking at.
    async fn resync(&mut self) {
        let updates: Vec<DocumentUpdate> = if self.pending.is_empty() {
            self.latest.iter().cloned().collect()
        } else {
            self.pending.drain(..).collect()
        };
        for (idx, update) in updates.iter().enumerate() {
            if !self.deliver(update.to_message()).await {
                // Keep what was not delivered for the next connection.
                self.pending.extend(updates[idx..].iter().cloned());
                return;
            }
            tracing::debug!(revision = %update.revision, "Resynchronized document");
        }
    }

    pub(crate) fn handle_connect_failed(&mut self, epoch: u64, error: ConnectionError) -> bool {
        if epoch != self.epoch || self.state != ConnectionState::Connecting {
            return false;
        }
        tracing::warn!(epoch, "Connecting failed: {error}");
        self.state = ConnectionState::Disconnected;
        self.connect_task = None;
        self.last_error = Some(error);
        true
    }

    /// Returns true when a live link was lost and reconnecting has begun.
    pub(crate) fn handle_dropped(&mut self, epoch: u64) -> bool {
        if !self.accepts(epoch) {
            return false;
        }
        tracing::info!(epoch, "Engine link dropped, reconnecting");
        self.outbound = None;
        self.begin_connect();
        true
    }

    /// Drop the link and stop reconnecting. `open()` may be called again.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.abandon_link();
        self.pending.clear();
        self.state = ConnectionState::Disconnected;
    }

    /// Explicit teardown. Terminal.
    pub fn close(&mut self) {
        self.abandon_link();
        self.pending.clear();
        self.state = ConnectionState::Closed;
    }

    fn abandon_link(&mut self) {
        self.epoch += 1;
        self.outbound = None;
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
    }

    fn begin_connect(&mut self) {
        self.abandon_link();
        self.state = ConnectionState::Connecting;
        let task = tokio::spawn(run_link(
            Arc::clone(&self.transport),
            self.retry.clone(),
            self.epoch,
            self.event_tx.clone(),
        ));
        self.connect_task = Some(task);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
    }
}

/// Connect with backoff, then forward the link's inbound traffic until it closes.
async fn run_link(
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
    epoch: u64,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    let Some(link) = connect_with_retry(transport.as_ref(), &retry, epoch, &event_tx).await else {
        return;
    };
    let Link {
        outbound,
        mut inbound,
    } = link;

    if event_tx
        .send(SessionEvent::Connected { epoch, outbound })
        .await
        .is_err()
    {
        return;
    }
    while let Some(message) = inbound.recv().await {
        if event_tx
            .send(SessionEvent::Message { epoch, message })
            .await
            .is_err()
        {
            return;
        }
    }
    let _ = event_tx.send(SessionEvent::Dropped { epoch }).await;
}

async fn connect_with_retry(
    transport: &dyn Transport,
    retry: &RetryConfig,
    epoch: u64,
    event_tx: &mpsc::Sender<SessionEvent>,
) -> Option<Link> {
    let mut backoff_step = 0;
    loop {
        match transport.connect().await {
            Ok(link) => return Some(link),
            Err(e) if backoff_step < retry.max_retries => {
                let delay = retry.delay_for(backoff_step);
                tracing::debug!(
                    epoch,
                    attempt = backoff_step + 1,
                    delay_ms = delay.as_millis(),
                    "Connect failed, retrying: {e}"
                );
                tokio::time::sleep(delay).await;
                backoff_step += 1;
            }
            Err(e) => {
                let error = ConnectionError::Unreachable {
                    attempts: backoff_step + 1,
                    message: e.to_string(),
                };
                let _ = event_tx
                    .send(SessionEvent::ConnectFailed { epoch, error })
                    .await;
                return None;
            }
        }
    }
}
