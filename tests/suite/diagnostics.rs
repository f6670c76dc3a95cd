//! Streamed diagnostics: ordering, replacement, navigation.

use modelsmith_types::{Revision, Severity};

use crate::common::{diagnostics, harness, push_diagnostics, wire};

#[tokio::test]
async fn late_push_for_older_revision_is_ignored() {
    let mut h = harness();
    let engine = h.open().await;
    h.store.edit("v1").await.unwrap();
    let (r2, _) = h.store.edit("v2").await.unwrap();

    push_diagnostics(&mut h, &engine, r2, vec![wire("w", Severity::Warning)]).await;

    // The reply for revision 1 arrives after revision 2's.
    assert!(
        engine
            .send(diagnostics(Revision::new(1), vec![wire("e", Severity::Error)]))
            .await
    );
    // And a duplicate for revision 2.
    assert!(engine.send(diagnostics(r2, vec![])).await);
    h.pump().await;
    h.pump().await;

    assert_eq!(h.store.diagnostics().revision(), r2);
    assert_eq!((h.store.error_count(), h.store.warning_count()), (0, 1));
}

#[tokio::test]
async fn newer_push_replaces_instead_of_merging() {
    let mut h = harness();
    let engine = h.open().await;

    let (r1, _) = h.store.edit("v1").await.unwrap();
    push_diagnostics(
        &mut h,
        &engine,
        r1,
        vec![
            wire("e1", Severity::Error),
            wire("e2", Severity::Error),
            wire("w1", Severity::Warning),
        ],
    )
    .await;
    assert_eq!((h.store.error_count(), h.store.warning_count()), (2, 1));

    let (r2, _) = h.store.edit("v2").await.unwrap();
    push_diagnostics(&mut h, &engine, r2, vec![]).await;
    assert_eq!((h.store.error_count(), h.store.warning_count()), (0, 0));
    assert!(h.store.next_diagnostic().is_none());
}

#[tokio::test]
async fn navigation_cycles_and_restarts_after_replace() {
    let mut h = harness();
    let engine = h.open().await;

    let (r1, _) = h.store.edit("v1").await.unwrap();
    push_diagnostics(
        &mut h,
        &engine,
        r1,
        vec![
            wire("a", Severity::Error),
            wire("b", Severity::Warning),
            wire("c", Severity::Info),
        ],
    )
    .await;

    let visited: Vec<String> = (0..4)
        .map(|_| h.store.next_diagnostic().unwrap().id().as_str().to_string())
        .collect();
    assert_eq!(visited, ["a", "b", "c", "a"]);

    let (r2, _) = h.store.edit("v2").await.unwrap();
    push_diagnostics(
        &mut h,
        &engine,
        r2,
        vec![wire("x", Severity::Warning), wire("y", Severity::Warning)],
    )
    .await;
    assert_eq!(h.store.next_diagnostic().unwrap().id().as_str(), "x");
}

#[tokio::test]
async fn malformed_push_keeps_previous_diagnostics() {
    let mut h = harness();
    let engine = h.open().await;

    let (r1, _) = h.store.edit("v1").await.unwrap();
    push_diagnostics(&mut h, &engine, r1, vec![wire("w", Severity::Warning)]).await;

    let (r2, _) = h.store.edit("v2").await.unwrap();
    assert!(
        engine
            .send(diagnostics(
                r2,
                vec![wire("dup", Severity::Error), wire("dup", Severity::Error)],
            ))
            .await
    );
    h.pump().await;

    assert_eq!(h.store.diagnostics().revision(), r1);
    assert_eq!((h.store.error_count(), h.store.warning_count()), (0, 1));
}

#[tokio::test]
async fn push_ahead_of_the_client_cannot_block_later_results() {
    let mut h = harness();
    let engine = h.open().await;
    let (r1, _) = h.store.edit("v1").await.unwrap();

    let bogus = diagnostics(Revision::new(u64::MAX), vec![wire("bogus", Severity::Error)]);
    assert!(engine.send(bogus).await);
    h.pump().await;
    assert_eq!(h.store.error_count(), 0);

    push_diagnostics(&mut h, &engine, r1, vec![wire("w", Severity::Warning)]).await;
    assert_eq!(h.store.diagnostics().revision(), r1);
    assert_eq!(h.store.warning_count(), 1);
}
