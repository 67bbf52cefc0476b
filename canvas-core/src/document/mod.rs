//! CRDT-backed canvas document.
//!
//! ```text
//! ┌──────────────────── Yrs Doc ─────────────────────┐
//! │ map "nodes"   id → NodeRecord (JSON: kind, data) │
//! │ map "pos_x"   id → f64                           │
//! │ map "pos_y"   id → f64                           │
//! │ map "edges"   id → EdgeRecord (JSON)             │
//! │ map "history" replica → change-set count         │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! A [`Document`] is an immutable snapshot: the encoded Yrs state plus its
//! materialized [`Canvas`]. Every mutation or merge rebuilds a private Yrs
//! `Doc` from that state, runs one transaction and snapshots the result, so
//! a value handed out is never changed underneath its holder.
//!
//! Conflict rule: concurrent writes to the same map key keep the write from
//! the highest client id, i.e. the highest [`ReplicaId`]. Causally later
//! writes always win.

mod codec;

pub use codec::FORMAT_VERSION;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use yrs::updates::decoder::Decode;
use yrs::{Any, Doc, Map, MapRef, Out, ReadTxn, StateVector, Transact, TransactionMut, Update};

use crate::model::{Canvas, Edge, Node, NodeKind, Position, ReplicaId};

const NODES: &str = "nodes";
const POS_X: &str = "pos_x";
const POS_Y: &str = "pos_y";
const EDGES: &str = "edges";
const HISTORY: &str = "history";

/// Errors raised by the document model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    /// Bytes do not decode to a well-formed causal history.
    #[error("corrupt document: {0}")]
    CorruptDocument(String),
    #[error("failed to encode document: {0}")]
    Encode(String),
    #[error("node {0} has a non-finite position")]
    NonFinitePosition(String),
}

impl From<yrs::encoding::read::Error> for DocumentError {
    fn from(e: yrs::encoding::read::Error) -> Self {
        DocumentError::CorruptDocument(e.to_string())
    }
}

/// Immutable fields of a node. Position lives in its own maps so that moving
/// a node never rewrites the record.
#[derive(Serialize, Deserialize)]
struct NodeRecord {
    kind: NodeKind,
    #[serde(default)]
    data: Value,
    order: u64,
}

#[derive(Serialize, Deserialize)]
struct EdgeRecord {
    order: u64,
    edge: Edge,
}

#[derive(Deserialize)]
struct Ordered {
    order: u64,
}

/// Root map handles of one Yrs doc.
struct Roots {
    nodes: MapRef,
    pos_x: MapRef,
    pos_y: MapRef,
    edges: MapRef,
    history: MapRef,
}

impl Roots {
    fn of(doc: &Doc) -> Self {
        Self {
            nodes: doc.get_or_insert_map(NODES),
            pos_x: doc.get_or_insert_map(POS_X),
            pos_y: doc.get_or_insert_map(POS_Y),
            edges: doc.get_or_insert_map(EDGES),
            history: doc.get_or_insert_map(HISTORY),
        }
    }
}

/// Mutable view handed to [`Document::mutate`]. Everything done through it
/// lands in a single transaction.
pub struct CanvasMut<'a, 'doc> {
    txn: &'a mut TransactionMut<'doc>,
    roots: &'a Roots,
}

impl CanvasMut<'_, '_> {
    pub fn contains_node(&self, id: &str) -> bool {
        self.roots.nodes.get(&*self.txn, id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<Position> {
        if !self.contains_node(id) {
            return None;
        }
        Some(Position {
            x: number(self.roots.pos_x.get(&*self.txn, id)).unwrap_or_default(),
            y: number(self.roots.pos_y.get(&*self.txn, id)).unwrap_or_default(),
        })
    }

    /// Move a node. Returns `false` when the node does not exist or the
    /// position is not finite.
    pub fn set_position(&mut self, id: &str, position: Position) -> bool {
        if !position.is_finite() || !self.contains_node(id) {
            return false;
        }
        self.roots.pos_x.insert(&mut *self.txn, id, position.x);
        self.roots.pos_y.insert(&mut *self.txn, id, position.y);
        true
    }

    /// Insert a node, or replace the one with the same id (keeping its
    /// display order).
    pub fn add_node(&mut self, node: Node) -> Result<(), DocumentError> {
        if !node.position.is_finite() {
            return Err(DocumentError::NonFinitePosition(node.id));
        }
        let order = match self.roots.nodes.get(&*self.txn, &node.id) {
            Some(existing) => read_json::<Ordered>(existing, &node.id)?.order,
            None => self.next_order(&self.roots.nodes)?,
        };
        let record = NodeRecord {
            kind: node.kind,
            data: node.data,
            order,
        };
        let json = to_json(&record)?;
        self.roots.nodes.insert(&mut *self.txn, node.id.as_str(), json);
        self.roots.pos_x.insert(&mut *self.txn, node.id.as_str(), node.position.x);
        self.roots.pos_y.insert(&mut *self.txn, node.id.as_str(), node.position.y);
        Ok(())
    }

    /// Remove a node. Edges pointing at it are left alone.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let removed = self.roots.nodes.remove(&mut *self.txn, id).is_some();
        self.roots.pos_x.remove(&mut *self.txn, id);
        self.roots.pos_y.remove(&mut *self.txn, id);
        removed
    }

    pub fn contains_edge(&self, id: &str) -> bool {
        self.roots.edges.get(&*self.txn, id).is_some()
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<(), DocumentError> {
        let order = match self.roots.edges.get(&*self.txn, &edge.id) {
            Some(existing) => read_json::<Ordered>(existing, &edge.id)?.order,
            None => self.next_order(&self.roots.edges)?,
        };
        let id = edge.id.clone();
        let json = to_json(&EdgeRecord { order, edge })?;
        self.roots.edges.insert(&mut *self.txn, id, json);
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &str) -> bool {
        self.roots.edges.remove(&mut *self.txn, id).is_some()
    }

    fn next_order(&self, map: &MapRef) -> Result<u64, DocumentError> {
        let mut next = 0;
        for (key, value) in map.iter(&*self.txn) {
            let ordered: Ordered = read_json(value, key)?;
            next = next.max(ordered.order + 1);
        }
        Ok(next)
    }
}

/// One immutable value of the canvas document.
#[derive(Clone)]
pub struct Document {
    replica: ReplicaId,
    state: Arc<[u8]>,
    canvas: Arc<Canvas>,
    history: Arc<BTreeMap<ReplicaId, u64>>,
}

impl Document {
    /// Fresh document seeded with `initial`. The seed is not counted as a
    /// change-set.
    pub fn create(initial: Canvas, replica: ReplicaId) -> Result<Self, DocumentError> {
        let doc = new_doc(replica);
        let roots = Roots::of(&doc);
        {
            let mut txn = doc.transact_mut();
            let mut view = CanvasMut {
                txn: &mut txn,
                roots: &roots,
            };
            for node in initial.nodes {
                view.add_node(node)?;
            }
            for edge in initial.edges {
                view.add_edge(edge)?;
            }
        }
        Self::snapshot(&doc, &roots, replica)
    }

    /// Apply `f` in one transaction and return the resulting snapshot, with
    /// one more change-set recorded for this replica. `self` is untouched.
    pub fn mutate<F>(&self, f: F) -> Result<Self, DocumentError>
    where
        F: FnOnce(&mut CanvasMut<'_, '_>),
    {
        let (doc, roots) = self.open()?;
        {
            let mut txn = doc.transact_mut();
            let mut view = CanvasMut {
                txn: &mut txn,
                roots: &roots,
            };
            f(&mut view);
            record_change(&mut txn, &roots, self.replica);
        }
        Self::snapshot(&doc, &roots, self.replica)
    }

    /// Join both causal histories. The result writes as `self`'s replica.
    pub fn merge(&self, other: &Document) -> Result<Self, DocumentError> {
        let (doc, roots) = self.open()?;
        integrate(&doc, &other.state)?;
        Self::snapshot(&doc, &roots, self.replica)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, DocumentError> {
        codec::seal(&self.state)
    }

    /// Decode a persisted blob. The returned value writes as a fresh random
    /// replica; use [`Document::deserialize_as`] to pick one.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, DocumentError> {
        Self::deserialize_as(bytes, ReplicaId::random())
    }

    pub fn deserialize_as(bytes: &[u8], replica: ReplicaId) -> Result<Self, DocumentError> {
        let update = codec::unseal(bytes)?;
        let doc = new_doc(replica);
        let roots = Roots::of(&doc);
        integrate(&doc, &update)?;
        Self::snapshot(&doc, &roots, replica)
    }

    /// Same content and history, recorded changes attributed to `replica`.
    pub fn with_replica(&self, replica: ReplicaId) -> Self {
        Self {
            replica,
            ..self.clone()
        }
    }

    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn nodes(&self) -> &[Node] {
        &self.canvas.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.canvas.edges
    }

    /// Change-sets recorded per replica.
    pub fn history(&self) -> &BTreeMap<ReplicaId, u64> {
        &self.history
    }

    /// Total change-sets in the causal history.
    pub fn history_len(&self) -> u64 {
        self.history.values().sum()
    }

    /// Size of the encoded CRDT state in bytes.
    pub fn state_size(&self) -> usize {
        self.state.len()
    }

    fn open(&self) -> Result<(Doc, Roots), DocumentError> {
        let doc = new_doc(self.replica);
        let roots = Roots::of(&doc);
        integrate(&doc, &self.state)?;
        Ok((doc, roots))
    }

    fn snapshot(doc: &Doc, roots: &Roots, replica: ReplicaId) -> Result<Self, DocumentError> {
        let txn = doc.transact();
        let state = txn.encode_state_as_update_v1(&StateVector::default());
        let canvas = materialize(&txn, roots)?;
        let history = read_history(&txn, roots)?;
        Ok(Self {
            replica,
            state: state.into(),
            canvas: Arc::new(canvas),
            history: Arc::new(history),
        })
    }
}

/// Field-for-field: same nodes, same edges, same history summary.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.canvas == other.canvas && self.history == other.history
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("replica", &self.replica)
            .field("nodes", &self.canvas.nodes.len())
            .field("edges", &self.canvas.edges.len())
            .field("history_len", &self.history_len())
            .field("state_size", &self.state.len())
            .finish()
    }
}

fn new_doc(replica: ReplicaId) -> Doc {
    Doc::with_client_id(replica.get().into())
}

fn integrate(doc: &Doc, update: &[u8]) -> Result<(), DocumentError> {
    let update = Update::decode_v1(update)?;
    let mut txn = doc.transact_mut();
    txn.apply_update(update)
        .map_err(|e| DocumentError::CorruptDocument(e.to_string()))
}

fn record_change(txn: &mut TransactionMut, roots: &Roots, replica: ReplicaId) {
    let key = replica.to_string();
    let count = history_count(roots.history.get(&*txn, &key)).unwrap_or(0);
    roots.history.insert(txn, key, Any::BigInt(count as i64 + 1));
}

fn materialize<T: ReadTxn>(txn: &T, roots: &Roots) -> Result<Canvas, DocumentError> {
    let mut nodes = Vec::new();
    for (id, value) in roots.nodes.iter(txn) {
        let record: NodeRecord = read_json(value, id)?;
        let position = Position {
            x: number(roots.pos_x.get(txn, id)).unwrap_or_default(),
            y: number(roots.pos_y.get(txn, id)).unwrap_or_default(),
        };
        let node = Node {
            id: id.to_string(),
            kind: record.kind,
            position,
            data: record.data,
        };
        nodes.push((record.order, node));
    }
    nodes.sort_by(|(a, an), (b, bn)| a.cmp(b).then_with(|| an.id.cmp(&bn.id)));

    let mut edges = Vec::new();
    for (id, value) in roots.edges.iter(txn) {
        let record: EdgeRecord = read_json(value, id)?;
        edges.push((record.order, record.edge));
    }
    edges.sort_by(|(a, ae), (b, be)| a.cmp(b).then_with(|| ae.id.cmp(&be.id)));

    Ok(Canvas {
        nodes: nodes.into_iter().map(|(_, n)| n).collect(),
        edges: edges.into_iter().map(|(_, e)| e).collect(),
    })
}

fn read_history<T: ReadTxn>(txn: &T, roots: &Roots) -> Result<BTreeMap<ReplicaId, u64>, DocumentError> {
    let mut history = BTreeMap::new();
    for (key, value) in roots.history.iter(txn) {
        let replica: ReplicaId = key
            .parse()
            .map_err(|_| DocumentError::CorruptDocument(format!("bad history key {key:?}")))?;
        let count = history_count(Some(value))
            .ok_or_else(|| DocumentError::CorruptDocument(format!("bad history count for {key}")))?;
        history.insert(replica, count);
    }
    Ok(history)
}

fn number(value: Option<Out>) -> Option<f64> {
    match value {
        Some(Out::Any(Any::Number(n))) => Some(n),
        Some(Out::Any(Any::BigInt(n))) => Some(n as f64),
        _ => None,
    }
}

/// History counters are integers; older states stored them as floats.
fn history_count(value: Option<Out>) -> Option<u64> {
    match value {
        Some(Out::Any(Any::BigInt(n))) => u64::try_from(n).ok(),
        Some(Out::Any(Any::Number(n))) if n.is_finite() && n >= 0.0 => Some(n as u64),
        _ => None,
    }
}

fn read_json<T: DeserializeOwned>(value: Out, key: &str) -> Result<T, DocumentError> {
    match value {
        Out::Any(Any::String(json)) => serde_json::from_str(&json)
            .map_err(|e| DocumentError::CorruptDocument(format!("record {key}: {e}"))),
        _ => Err(DocumentError::CorruptDocument(format!(
            "record {key}: expected a JSON string"
        ))),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, DocumentError> {
    serde_json::to_string(value).map_err(|e| DocumentError::Encode(e.to_string()))
}
