//! Session-level flows against a shared in-memory store.
//!
//! Verifies:
//! - first run starts from the seed and persists it verbatim
//! - concurrent drags from two sessions both survive
//! - a corrupt slot is reported, never replaced by a default
//! - reset and explicit recovery

use std::sync::Arc;

use canvas_core::{initial_canvas, Document, Position, PositionChange, ReplicaId};
use canvas_sync::{
    CanvasSession, LoadOutcome, MemoryStore, SessionConfig, SlotStore, SyncError, ViewState,
};

fn session(store: &Arc<MemoryStore>, replica: u64) -> CanvasSession {
    CanvasSession::new(
        store.clone(),
        SessionConfig::for_testing().with_replica(ReplicaId::new(replica)),
    )
}

fn position(session: &CanvasSession, id: &str) -> Position {
    session.document().unwrap().canvas().node(id).unwrap().position
}

#[tokio::test(start_paused = true)]
async fn test_first_run_persists_seed_verbatim() {
    let store = Arc::new(MemoryStore::new());
    let mut s = session(&store, 1);
    assert_eq!(s.view(), ViewState::Loading);

    assert_eq!(s.load().await.unwrap(), LoadOutcome::FirstRun);
    let view = s.view();
    let view = view.as_ready().unwrap();
    assert_eq!(view.nodes.len(), 3);
    assert_eq!(view.edges.len(), 2);

    assert!(s.flush().await.unwrap());
    let bytes = store.get("canvas").unwrap().unwrap();
    assert_eq!(bytes, s.document().unwrap().serialize().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_drag_from_two_sessions() {
    let store = Arc::new(MemoryStore::new());

    let mut a = session(&store, 11);
    a.load().await.unwrap();
    a.flush().await.unwrap();

    let mut b = session(&store, 12);
    assert_eq!(b.load().await.unwrap(), LoadOutcome::Restored);

    a.apply_changes(&[PositionChange::new("2", 120.0, 140.0)]).unwrap();
    b.apply_changes(&[PositionChange::new("3", 420.0, 90.0)]).unwrap();
    a.flush().await.unwrap();
    b.flush().await.unwrap();

    // b merged a's save into its own
    assert!(b.refresh().unwrap());
    assert_eq!(position(&b, "2"), Position::new(120.0, 140.0));
    assert_eq!(position(&b, "3"), Position::new(420.0, 90.0));

    let mut c = session(&store, 13);
    c.load().await.unwrap();
    assert_eq!(position(&c, "2"), Position::new(120.0, 140.0));
    assert_eq!(position(&c, "3"), Position::new(420.0, 90.0));
    assert_eq!(c.document().unwrap().history_len(), 2);

    // a picks up b's drag on its next save
    a.apply_changes(&[PositionChange::new("1", 0.0, 0.0)]).unwrap();
    a.flush().await.unwrap();
    a.refresh().unwrap();
    assert_eq!(position(&a, "3"), Position::new(420.0, 90.0));
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_storage_is_reported() {
    let store = Arc::new(MemoryStore::new());
    store.set("canvas", b"\x00\x01garbage").unwrap();

    let mut s = session(&store, 1);
    let err = s.load().await.unwrap_err();
    assert!(err.is_corrupt());
    assert!(matches!(s.view(), ViewState::Loading));
    assert!(matches!(
        s.apply_changes(&[PositionChange::new("1", 1.0, 1.0)]),
        Err(SyncError::NotLoaded)
    ));

    assert!(!s.flush().await.unwrap());
    assert_eq!(store.get("canvas").unwrap().unwrap(), b"\x00\x01garbage");
}

#[tokio::test(start_paused = true)]
async fn test_recover_fresh_quarantines_corrupt_blob() {
    let store = Arc::new(MemoryStore::new());
    store.set("canvas", b"\x00\x01garbage").unwrap();

    let mut s = session(&store, 1);
    assert!(s.load().await.is_err());
    s.recover_fresh().await.unwrap();

    assert_eq!(store.get("canvas.corrupt").unwrap().unwrap(), b"\x00\x01garbage");
    assert!(s.view().is_ready());
    assert_eq!(s.document().unwrap().canvas(), &initial_canvas());

    s.flush().await.unwrap();
    let restored = Document::deserialize(&store.get("canvas").unwrap().unwrap()).unwrap();
    assert_eq!(restored.canvas(), &initial_canvas());
}

#[tokio::test(start_paused = true)]
async fn test_recover_fresh_drops_configured_replica() {
    let store = Arc::new(MemoryStore::new());
    store.set("canvas", b"\x00\x01garbage").unwrap();

    let mut s = session(&store, 1);
    assert!(s.load().await.is_err());
    s.recover_fresh().await.unwrap();

    // the pinned id may have written into the discarded history
    let replica = s.document().unwrap().replica();
    assert_ne!(replica, ReplicaId::new(1));

    s.apply_changes(&[PositionChange::new("2", 5.0, 5.0)]).unwrap();
    s.flush().await.unwrap();
    let restored = Document::deserialize(&store.get("canvas").unwrap().unwrap()).unwrap();
    assert_eq!(restored.history().get(&replica), Some(&1));
    assert_eq!(restored.history().get(&ReplicaId::new(1)), None);
}

#[tokio::test(start_paused = true)]
async fn test_reset_restarts_from_seed() {
    let store = Arc::new(MemoryStore::new());
    let mut s = session(&store, 7);
    s.load().await.unwrap();
    s.apply_changes(&[PositionChange::new("2", 500.0, 500.0)]).unwrap();
    s.flush().await.unwrap();

    s.reset().await.unwrap();
    assert_eq!(store.get("canvas").unwrap(), None);
    assert_eq!(position(&s, "2"), Position::new(100.0, 100.0));
    assert_eq!(s.document().unwrap().history_len(), 0);
    assert_ne!(s.document().unwrap().replica(), ReplicaId::new(7));

    // the old save must not come back through the reconciled channel
    s.apply_changes(&[PositionChange::new("3", 1.0, 1.0)]).unwrap();
    assert_eq!(position(&s, "2"), Position::new(100.0, 100.0));
    s.flush().await.unwrap();
    let stored = Document::deserialize(&store.get("canvas").unwrap().unwrap()).unwrap();
    assert_eq!(stored.canvas().node("2").unwrap().position, Position::new(100.0, 100.0));
}

#[tokio::test(start_paused = true)]
async fn test_view_subscription_follows_changes() {
    let store = Arc::new(MemoryStore::new());
    let mut s = session(&store, 1);
    let mut views = s.subscribe_view();
    assert_eq!(*views.borrow_and_update(), ViewState::Loading);

    s.load().await.unwrap();
    assert!(views.has_changed().unwrap());
    assert!(views.borrow_and_update().is_ready());

    let outcome = s
        .apply_changes(&[
            PositionChange::new("1", 5.0, 6.0),
            PositionChange::new("missing", 0.0, 0.0),
        ])
        .unwrap();
    assert_eq!(outcome.applied, vec!["1".to_string()]);
    assert_eq!(outcome.skipped, vec!["missing".to_string()]);

    let view = views.borrow_and_update().clone();
    let node = view.as_ready().unwrap().nodes.iter().find(|n| n.id == "1").unwrap().clone();
    assert_eq!(node.position, Position::new(5.0, 6.0));
}
