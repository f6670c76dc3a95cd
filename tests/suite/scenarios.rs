//! End-to-end session flows against an in-memory engine.

use modelsmith_session::{
    ClientMessage, ConnectionState, GenerateError, GenerationPhase, GenerationStatus,
    ServerMessage,
};
use modelsmith_types::{Artifact, Revision, Severity};

use crate::common::{harness, push_diagnostics, wire};

#[tokio::test]
async fn errors_block_until_fixed_then_generation_succeeds() {
    let mut h = harness();
    let mut engine = h.open().await;

    let (r1, _) = h.store.edit("sig Person { age: Int").await.unwrap();
    push_diagnostics(&mut h, &engine, r1, vec![wire("syntax", Severity::Error)]).await;
    assert_eq!((h.store.error_count(), h.store.warning_count()), (1, 0));

    let err = h.store.generate().await.unwrap_err();
    assert_eq!(err, GenerateError::BlockedByErrors { errors: 1 });
    assert_eq!(h.store.snapshot().generation, GenerationPhase::BlockedByErrors);
    // The refused request never reached the engine.
    assert!(
        engine
            .drain()
            .iter()
            .all(|m| !matches!(m, ClientMessage::Generate { .. }))
    );

    let (r2, _) = h.store.edit("sig Person { age: Int }").await.unwrap();
    push_diagnostics(&mut h, &engine, r2, vec![wire("unused", Severity::Warning)]).await;
    assert_eq!((h.store.error_count(), h.store.warning_count()), (0, 1));
    assert_eq!(h.store.snapshot().generate_label(false), "Generate (1 warning)");
    assert_eq!(h.store.snapshot().generate_label(true), "Generate");

    let handle = h.store.generate().await.unwrap();
    assert_eq!(handle.revision(), r2);
    let generate = engine
        .drain()
        .into_iter()
        .find(|m| matches!(m, ClientMessage::Generate { .. }))
        .expect("generate message sent");
    assert_eq!(generate.kind(), "generate");

    assert!(
        engine
            .send(ServerMessage::Result {
                id: handle.id(),
                revision: r2,
                artifact: Artifact::new("instances/person-1").with_summary("3 atoms"),
            })
            .await
    );
    h.pump_until(|store| store.active_generation().is_none())
        .await;

    assert_eq!(
        handle.outcome().await,
        GenerationStatus::Succeeded(Artifact::new("instances/person-1").with_summary("3 atoms"))
    );
    assert_eq!(h.store.snapshot().generation, GenerationPhase::Idle);
}

#[tokio::test]
async fn link_drop_cancels_generation_and_resends_latest_revision() {
    let mut h = harness();
    let mut engine = h.open().await;

    h.store.edit("sig A {}").await.unwrap();
    let (latest, _) = h.store.edit("sig A {} sig B {}").await.unwrap();
    push_diagnostics(&mut h, &engine, latest, vec![]).await;

    let handle = h.store.generate().await.unwrap();
    assert!(matches!(handle.status(), GenerationStatus::Running { .. }));
    engine.drain();

    drop(engine);
    h.pump_until(|store| store.state() != ConnectionState::Open)
        .await;
    assert_eq!(h.store.state(), ConnectionState::Connecting);
    assert_eq!(handle.outcome().await, GenerationStatus::Cancelled);

    h.pump_until(|store| store.is_open()).await;
    let mut engine = h.accept().await;
    assert_eq!(
        engine.drain(),
        vec![ClientMessage::Update {
            revision: latest,
            document: "sig A {} sig B {}".to_string(),
        }]
    );
    assert_eq!(h.transport.attempts(), 2);
}

#[tokio::test]
async fn snapshot_subscribers_follow_the_session() {
    let mut h = harness();
    let mut rx = h.store.subscribe();
    assert_eq!(rx.borrow_and_update().state, ConnectionState::Disconnected);

    let engine = h.open().await;
    assert!(rx.borrow_and_update().is_open());

    let (revision, _) = h.store.edit("sig A {}").await.unwrap();
    push_diagnostics(
        &mut h,
        &engine,
        revision,
        vec![wire("e1", Severity::Error), wire("e2", Severity::Error)],
    )
    .await;

    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.revision, Revision::new(1));
    assert_eq!(snapshot.diagnostics_revision, revision);
    assert_eq!(snapshot.counts.errors, 2);
    assert_eq!(snapshot.generate_label(false), "2 errors");

    h.store.close();
    assert_eq!(rx.borrow_and_update().state, ConnectionState::Closed);
}
