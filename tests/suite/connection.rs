//! Connection lifecycle: queueing, retries, teardown.

use modelsmith_session::{
    ClientMessage, ConnectionConfig, ConnectionError, ConnectionState, SendOutcome, SessionConfig,
};
use modelsmith_types::Revision;

use crate::common::{fast_config, harness, harness_with};

fn update_revisions(messages: &[ClientMessage]) -> Vec<u64> {
    messages
        .iter()
        .filter_map(|m| match m {
            ClientMessage::Update { revision, .. } => Some(revision.value()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn queue_overflow_drops_oldest_and_keeps_order() {
    let mut h = harness_with(SessionConfig {
        connection: ConnectionConfig {
            send_queue_capacity: 3,
            ..fast_config().connection
        },
        ..SessionConfig::default()
    });
    h.store.open().unwrap();

    for text in ["a", "b", "c", "d", "e"] {
        let (_, outcome) = h.store.edit(text).await.unwrap();
        assert_eq!(outcome, SendOutcome::Queued);
    }

    h.pump_until(|store| store.is_open()).await;
    let mut engine = h.accept().await;
    assert_eq!(update_revisions(&engine.drain()), [3, 4, 5]);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let mut h = harness();
    h.transport.fail_next(2);
    let _engine = h.open().await;
    assert_eq!(h.transport.attempts(), 3);
    assert!(h.store.last_connection_error().is_none());
}

#[tokio::test]
async fn exhausted_retries_leave_session_disconnected() {
    let mut h = harness();
    h.transport.set_available(false);
    h.store.open().unwrap();

    h.pump_until(|store| store.state() == ConnectionState::Disconnected)
        .await;
    let err = h.store.last_connection_error().cloned().unwrap();
    assert!(matches!(err, ConnectionError::Unreachable { attempts: 3, .. }));
    assert_eq!(h.store.snapshot().last_connection_error, Some(err));

    // A later open() starts over and clears the error once connected.
    h.transport.set_available(true);
    let _engine = h.open().await;
    assert!(h.store.last_connection_error().is_none());
}

#[tokio::test]
async fn nan_jitter_still_reports_exhausted_retries() {
    let mut h = harness_with(SessionConfig {
        connection: ConnectionConfig {
            jitter_factor: f64::NAN,
            ..fast_config().connection
        },
        ..SessionConfig::default()
    });
    h.transport.set_available(false);
    h.store.open().unwrap();

    h.pump_until(|store| store.state() == ConnectionState::Disconnected)
        .await;
    assert!(matches!(
        h.store.last_connection_error(),
        Some(ConnectionError::Unreachable { attempts: 3, .. })
    ));
}

#[tokio::test]
async fn stale_and_deferred_sends() {
    let mut h = harness();
    let (revision, outcome) = h.store.edit("draft").await.unwrap();
    assert_eq!(revision, Revision::new(1));
    assert_eq!(outcome, SendOutcome::Deferred);

    let mut engine = h.open().await;
    assert_eq!(update_revisions(&engine.drain()), [1]);

    let (_, outcome) = h.store.edit("next").await.unwrap();
    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(h.store.current_revision(), Revision::new(2));
}

#[tokio::test]
async fn disconnect_then_reopen_resyncs() {
    let mut h = harness();
    let mut engine = h.open().await;
    h.store.edit("v1").await.unwrap();
    engine.drain();

    h.store.disconnect();
    assert_eq!(h.store.state(), ConnectionState::Disconnected);
    assert!(!h.store.is_open());

    let (_, outcome) = h.store.edit("v2").await.unwrap();
    assert_eq!(outcome, SendOutcome::Deferred);

    let mut engine = h.open().await;
    assert_eq!(
        engine.drain(),
        vec![ClientMessage::Update {
            revision: Revision::new(2),
            document: "v2".to_string(),
        }]
    );
}

#[tokio::test]
async fn close_is_terminal() {
    let mut h = harness();
    let _engine = h.open().await;
    h.store.close();

    assert_eq!(h.store.state(), ConnectionState::Closed);
    assert_eq!(h.store.open(), Err(ConnectionError::Closed));
    assert_eq!(
        h.store.edit("late").await.unwrap_err(),
        ConnectionError::Closed
    );
}
