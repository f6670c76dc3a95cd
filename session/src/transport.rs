//! Transport seam between the session and the engine.
//!
//! A transport only knows how to establish a [`Link`]: a pair of channels
//! carrying typed messages. The link's `inbound` receiver yielding `None` is
//! the close notification; dropping `outbound` tells the transport to shut the
//! connection down.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage};

/// Capacity of each link direction.
pub const LINK_CHANNEL_CAPACITY: usize = 64;

/// Connect future type alias.
pub type TransportFut<'a> = Pin<Box<dyn Future<Output = Result<Link, TransportError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<ServerMessage>,
}

pub trait Transport: Send + Sync {
    /// Human-readable peer description for logs.
    fn describe(&self) -> String;

    fn connect(&self) -> TransportFut<'_>;
}

// ============================================================================
// In-process transport
// ============================================================================

/// Engine-side half of an in-memory link.
#[derive(Debug)]
pub struct EngineEnd {
    from_client: mpsc::Receiver<ClientMessage>,
    to_client: mpsc::Sender<ServerMessage>,
}

impl EngineEnd {
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        self.from_client.try_recv().ok()
    }

    /// Everything the client has sent so far, without waiting.
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.from_client.try_recv() {
            out.push(message);
        }
        out
    }

    /// Returns false once the client side is gone.
    pub async fn send(&self, message: ServerMessage) -> bool {
        self.to_client.send(message).await.is_ok()
    }
}

/// Accept side of a [`MemoryTransport`]: one [`EngineEnd`] per successful connect.
#[derive(Debug)]
pub struct MemoryAcceptor {
    rx: mpsc::UnboundedReceiver<EngineEnd>,
}

impl MemoryAcceptor {
    pub async fn accept(&mut self) -> Option<EngineEnd> {
        self.rx.recv().await
    }

    pub fn try_accept(&mut self) -> Option<EngineEnd> {
        self.rx.try_recv().ok()
    }
}

/// Transport that connects to an engine living in the same process.
///
/// Connect attempts can be made to fail, either for a fixed number of
/// attempts or until the transport is marked available again.
#[derive(Debug)]
pub struct MemoryTransport {
    accept_tx: mpsc::UnboundedSender<EngineEnd>,
    failures_remaining: AtomicU32,
    available: AtomicBool,
    attempts: AtomicU32,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> (Self, MemoryAcceptor) {
        let (accept_tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            accept_tx,
            failures_remaining: AtomicU32::new(0),
            available: AtomicBool::new(true),
            attempts: AtomicU32::new(0),
        };
        (transport, MemoryAcceptor { rx })
    }

    /// Fail the next `n` connect attempts.
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Connect attempts made so far, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn take_scripted_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn establish(&self) -> Result<Link, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("engine offline".to_string()));
        }
        if self.take_scripted_failure() {
            return Err(TransportError::Unavailable(
                "connection refused".to_string(),
            ));
        }

        let (outbound, from_client) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        let (to_client, inbound) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        self.accept_tx
            .send(EngineEnd {
                from_client,
                to_client,
            })
            .map_err(|_| TransportError::Unavailable("no engine accepting".to_string()))?;
        Ok(Link { outbound, inbound })
    }
}

impl Transport for MemoryTransport {
    fn describe(&self) -> String {
        "in-memory engine".to_string()
    }

    fn connect(&self) -> TransportFut<'_> {
        Box::pin(async move { self.establish() })
    }
}
