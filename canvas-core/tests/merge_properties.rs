//! Merge laws and round-trip behaviour of the canvas document.
//!
//! Verifies:
//! - merge is commutative, associative and idempotent
//! - serialize/deserialize preserves every reachable document
//! - dangling edges survive a merge but never reach the render projection

use canvas_core::{
    apply_changes, initial_canvas, CanvasView, Document, Edge, Node, NodeKind, Position,
    PositionChange, ReplicaId,
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn ancestor() -> Document {
    Document::create(initial_canvas(), ReplicaId::new(1)).unwrap()
}

fn moved(base: &Document, replica: u64, node: &str, x: f64, y: f64) -> Document {
    apply_changes(
        &base.with_replica(ReplicaId::new(replica)),
        &[PositionChange::new(node, x, y)],
    )
    .unwrap()
}

/// Three replicas diverged from one ancestor, touching overlapping nodes.
fn three_replicas() -> (Document, Document, Document) {
    let base = ancestor();
    let a = moved(&base, 11, "2", 120.0, 140.0);
    let b = moved(&base, 12, "3", 420.0, 90.0);
    let c = base
        .with_replica(ReplicaId::new(13))
        .mutate(|canvas| {
            canvas.set_position("2", Position::new(-5.0, -5.0));
            canvas
                .add_node(Node::new("4", NodeKind::Custom, 10.0, 10.0))
                .unwrap();
            canvas.add_edge(Edge::new("e3-4", "3", "4")).unwrap();
        })
        .unwrap();
    (a, b, c)
}

// ─── Laws ────────────────────────────────────────────────────────────────────

#[test]
fn test_merge_commutative() {
    let (a, b, c) = three_replicas();
    for (x, y) in [(&a, &b), (&a, &c), (&b, &c)] {
        assert_eq!(x.merge(y).unwrap(), y.merge(x).unwrap());
    }
}

#[test]
fn test_merge_associative() {
    let (a, b, c) = three_replicas();
    let left = a.merge(&b).unwrap().merge(&c).unwrap();
    let right = a.merge(&b.merge(&c).unwrap()).unwrap();
    assert_eq!(left, right);
}

#[test]
fn test_merge_idempotent() {
    let (a, _, c) = three_replicas();
    assert_eq!(a.merge(&a).unwrap(), a);
    let ac = a.merge(&c).unwrap();
    assert_eq!(ac.merge(&c).unwrap(), ac);
    assert_eq!(ac.merge(&a).unwrap(), ac);
}

#[test]
fn test_merge_with_ancestor_is_noop() {
    let base = ancestor();
    let a = moved(&base, 11, "1", 0.0, 0.0);
    assert_eq!(a.merge(&base).unwrap(), a);
    assert_eq!(base.merge(&a).unwrap(), a);
}

#[test]
fn test_concurrent_moves_of_distinct_nodes_both_kept() {
    let (a, b, _) = three_replicas();
    let merged = a.merge(&b).unwrap();
    assert_eq!(merged.canvas().node("2").unwrap().position, Position::new(120.0, 140.0));
    assert_eq!(merged.canvas().node("3").unwrap().position, Position::new(420.0, 90.0));
    assert_eq!(merged.history_len(), 2);
}

#[test]
fn test_same_node_conflict_resolved_by_highest_replica() {
    // a (replica 11) and c (replica 13) both moved node "2"
    let (a, _, c) = three_replicas();
    let merged = a.merge(&c).unwrap();
    assert_eq!(merged.canvas().node("2").unwrap().position, Position::new(-5.0, -5.0));
}

// ─── Round trip ──────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_every_reachable_document() {
    let (a, b, c) = three_replicas();
    let merged = a.merge(&b).unwrap().merge(&c).unwrap();
    for doc in [ancestor(), a, b, c, merged] {
        let restored = Document::deserialize(&doc.serialize().unwrap()).unwrap();
        assert_eq!(restored, doc);
        assert_eq!(restored.nodes(), doc.nodes());
        assert_eq!(restored.edges(), doc.edges());
    }
}

#[test]
fn test_restored_document_merges_with_live_one() {
    let base = ancestor();
    let persisted = Document::deserialize(&base.serialize().unwrap()).unwrap();
    let live = moved(&base, 40, "3", 1.0, 2.0);
    assert_eq!(persisted.merge(&live).unwrap(), live);
}

// ─── Dangling edges ─────────────────────────────────────────────────────────

#[test]
fn test_dangling_edge_after_merge() {
    let base = ancestor();
    let deleted = base
        .with_replica(ReplicaId::new(21))
        .mutate(|canvas| {
            assert!(canvas.remove_node("2"));
        })
        .unwrap();
    let moved_meanwhile = moved(&base, 22, "2", 300.0, 300.0);

    let merged = deleted.merge(&moved_meanwhile).unwrap();

    assert!(merged.canvas().node("2").is_none());
    assert!(merged.canvas().edge("e1-2").is_some(), "edge stays in the document");

    let view = CanvasView::project(merged.canvas());
    assert!(view.edges.iter().all(|e| e.edge.id != "e1-2"));
    assert!(view.edges.iter().any(|e| e.edge.id == "e1-3"));
    assert_eq!(view.dangling, 1);
}
