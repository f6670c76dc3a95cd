//! Shared test utilities and fixtures
//!
//! A `SessionStore` wired to an in-memory engine, plus builders for the
//! messages the engine sends.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use modelsmith_session::{
    ConnectionConfig, EngineEnd, MemoryAcceptor, MemoryTransport, ServerMessage, SessionConfig,
    SessionStore, WireDiagnostic,
};
use modelsmith_types::{Revision, Severity};

/// Upper bound for any single wait in a test.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Millisecond backoff so reconnect paths run quickly.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        connection: ConnectionConfig {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            jitter_factor: 0.0,
            send_queue_capacity: 8,
        },
        ..SessionConfig::default()
    }
}

pub struct Harness {
    pub store: SessionStore,
    pub transport: Arc<MemoryTransport>,
    pub acceptor: MemoryAcceptor,
}

pub fn harness() -> Harness {
    harness_with(fast_config())
}

pub fn harness_with(config: SessionConfig) -> Harness {
    let (transport, acceptor) = MemoryTransport::new();
    let transport = Arc::new(transport);
    let store = SessionStore::new(transport.clone(), config);
    Harness {
        store,
        transport,
        acceptor,
    }
}

impl Harness {
    /// Open the session and return the engine side of the link.
    pub async fn open(&mut self) -> EngineEnd {
        self.store.open().unwrap();
        self.pump_until(SessionStore::is_open).await;
        self.accept().await
    }

    pub async fn accept(&mut self) -> EngineEnd {
        tokio::time::timeout(STEP_TIMEOUT, self.acceptor.accept())
            .await
            .expect("timed out waiting for a connection")
            .expect("transport dropped")
    }

    /// Apply exactly one session event.
    pub async fn pump(&mut self) {
        let processed = tokio::time::timeout(STEP_TIMEOUT, self.store.process_next_event())
            .await
            .expect("timed out waiting for a session event");
        assert!(processed, "session event channel closed");
    }

    pub async fn pump_until(&mut self, done: impl Fn(&SessionStore) -> bool) {
        while !done(&self.store) {
            self.pump().await;
        }
    }
}

pub fn wire(id: &str, severity: Severity) -> WireDiagnostic {
    WireDiagnostic {
        id: id.to_string(),
        severity,
        message: format!("{id}: {} reported", severity.label()),
        location: None,
    }
}

pub fn diagnostics(revision: Revision, items: Vec<WireDiagnostic>) -> ServerMessage {
    ServerMessage::Diagnostics {
        revision,
        diagnostics: items,
    }
}

/// Push diagnostics and wait until the store has installed them.
pub async fn push_diagnostics(
    h: &mut Harness,
    engine: &EngineEnd,
    revision: Revision,
    items: Vec<WireDiagnostic>,
) {
    assert!(engine.send(diagnostics(revision, items)).await);
    h.pump_until(|store| store.diagnostics().revision() >= revision)
        .await;
}
