//! Single-flight generation through the store.

use modelsmith_session::{
    ClientMessage, ConnectionError, GenerateError, GenerationConfig, GenerationPhase,
    GenerationStatus, ServerMessage, SessionConfig,
};
use modelsmith_types::{Artifact, FailureKind, GenerationId, Revision, Severity};

use crate::common::{fast_config, harness, harness_with, push_diagnostics, wire};

fn generate_count(messages: &[ClientMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ClientMessage::Generate { .. }))
        .count()
}

#[tokio::test]
async fn blocked_generate_sends_nothing() {
    let mut h = harness();
    let mut engine = h.open().await;
    let (revision, _) = h.store.edit("v1").await.unwrap();
    push_diagnostics(&mut h, &engine, revision, vec![wire("e", Severity::Error)]).await;
    engine.drain();

    for _ in 0..3 {
        assert_eq!(
            h.store.generate().await.unwrap_err(),
            GenerateError::BlockedByErrors { errors: 1 }
        );
    }
    assert!(engine.drain().is_empty());
    // Navigation stays available while generation is refused.
    assert_eq!(h.store.next_diagnostic().unwrap().id().as_str(), "e");
}

#[tokio::test]
async fn rapid_generate_calls_start_one_job() {
    let mut h = harness();
    let mut engine = h.open().await;
    h.store.edit("v1").await.unwrap();

    let first = h.store.generate().await.unwrap();
    let second = h.store.generate().await.unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(generate_count(&engine.drain()), 1);
    assert_eq!(h.store.snapshot().generation, GenerationPhase::Running);
}

#[tokio::test]
async fn edit_then_generate_supersedes_previous_request() {
    let mut h = harness();
    let mut engine = h.open().await;
    h.store.edit("v1").await.unwrap();
    let old = h.store.generate().await.unwrap();

    let (r2, _) = h.store.edit("v2").await.unwrap();
    let new = h.store.generate().await.unwrap();
    assert_eq!(new.revision(), r2);
    assert_eq!(old.outcome().await, GenerationStatus::Cancelled);

    let sent = engine.drain();
    assert!(sent.contains(&ClientMessage::Cancel { id: old.id() }));
    assert_eq!(generate_count(&sent), 2);

    // A reply to the cancelled request must not resolve the new one.
    assert!(
        engine
            .send(ServerMessage::Result {
                id: old.id(),
                revision: Revision::new(1),
                artifact: Artifact::new("stale"),
            })
            .await
    );
    h.pump().await;
    assert!(matches!(new.status(), GenerationStatus::Running { .. }));
}

#[tokio::test]
async fn replies_for_unknown_ids_are_ignored() {
    let mut h = harness();
    let engine = h.open().await;
    h.store.edit("v1").await.unwrap();
    let handle = h.store.generate().await.unwrap();

    assert!(
        engine
            .send(ServerMessage::Error {
                id: GenerationId::new_v4(),
                revision: Revision::new(1),
                kind: FailureKind::Internal,
                message: "not yours".to_string(),
            })
            .await
    );
    h.pump().await;
    assert!(matches!(handle.status(), GenerationStatus::Running { .. }));

    assert!(
        engine
            .send(ServerMessage::Status {
                id: handle.id(),
                message: "42 of 100 clauses".to_string(),
            })
            .await
    );
    h.pump().await;
    assert_eq!(
        handle.status(),
        GenerationStatus::Running {
            progress: Some("42 of 100 clauses".to_string())
        }
    );
}

#[tokio::test]
async fn engine_failure_is_reported_and_retryable() {
    let mut h = harness();
    let engine = h.open().await;
    h.store.edit("v1").await.unwrap();
    let handle = h.store.generate().await.unwrap();

    assert!(
        engine
            .send(ServerMessage::Error {
                id: handle.id(),
                revision: Revision::new(1),
                kind: FailureKind::Unsatisfiable,
                message: "no instance found".to_string(),
            })
            .await
    );
    h.pump().await;
    let GenerationStatus::Failed(failure) = handle.outcome().await else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::Unsatisfiable);

    let retry = h.store.generate().await.unwrap();
    assert_ne!(retry.id(), handle.id());
}

#[tokio::test]
async fn explicit_cancel_resolves_cancelled() {
    let mut h = harness();
    let mut engine = h.open().await;
    h.store.edit("v1").await.unwrap();
    let handle = h.store.generate().await.unwrap();

    assert!(h.store.cancel_generation().await);
    assert_eq!(handle.outcome().await, GenerationStatus::Cancelled);
    assert_eq!(
        engine.drain().pop(),
        Some(ClientMessage::Cancel { id: handle.id() })
    );
    assert!(!h.store.cancel_generation().await);
}

#[tokio::test]
async fn generate_requires_a_live_session() {
    let mut h = harness();
    assert_eq!(
        h.store.generate().await.unwrap_err(),
        GenerateError::NoDocument
    );

    h.store.edit("v1").await.unwrap();
    assert_eq!(
        h.store.generate().await.unwrap_err(),
        GenerateError::Connection(ConnectionError::NotConnected)
    );
}

#[tokio::test]
async fn pending_request_is_issued_once_connected() {
    let mut h = harness();
    h.store.open().unwrap();
    h.store.edit("v1").await.unwrap();
    let handle = h.store.generate().await.unwrap();
    assert_eq!(handle.status(), GenerationStatus::Pending);
    assert_eq!(h.store.snapshot().generation, GenerationPhase::Pending);

    h.pump_until(|store| store.is_open()).await;
    let mut engine = h.accept().await;
    let sent = engine.drain();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].kind(), "generate");
    assert!(matches!(handle.status(), GenerationStatus::Running { .. }));
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
    let mut h = harness_with(SessionConfig {
        generation: GenerationConfig {
            timeout_secs: 2,
            random_seed: Some(1),
        },
        ..fast_config()
    });
    let mut engine = h.open().await;
    h.store.edit("v1").await.unwrap();
    let handle = h.store.generate().await.unwrap();

    h.pump_until(|store| store.active_generation().is_none())
        .await;
    let GenerationStatus::Failed(failure) = handle.outcome().await else {
        panic!("expected timeout failure");
    };
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(
        engine.drain().pop(),
        Some(ClientMessage::Cancel { id: handle.id() })
    );
}
