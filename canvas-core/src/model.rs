//! Plain value types for the canvas graph.
//!
//! These are what the rendering side sees. The CRDT representation lives in
//! [`crate::document`]; everything here is materialized from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 2D position of a node on the canvas.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// NaN and infinities never enter a document.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Node variant. Picks the renderer on the UI side.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Input,
    Output,
    #[default]
    Default,
    Custom,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Input => write!(f, "input"),
            NodeKind::Output => write!(f, "output"),
            NodeKind::Default => write!(f, "default"),
            NodeKind::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "input" => Ok(NodeKind::Input),
            "output" => Ok(NodeKind::Output),
            "default" => Ok(NodeKind::Default),
            "custom" => Ok(NodeKind::Custom),
            other => Err(format!("unknown node kind: {other}")),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    pub position: Position,
    /// Labels and per-node configuration. Never interpreted by the core.
    #[serde(default)]
    pub data: Value,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            position: Position::new(x, y),
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// `data.label` when present.
    pub fn label(&self) -> Option<&str> {
        self.data.get("label").and_then(Value::as_str)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Output port on the source node; the renderer maps it to an edge style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            label: None,
            animated: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn animated(mut self) -> Self {
        self.animated = true;
        self
    }
}

/// Materialized `{nodes, edges}` content of a document, in display order.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Canvas {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Canvas {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }
}

/// CRDT writer identity.
///
/// Concurrent writes to the same field resolve to the highest replica id.
/// Two independent lines of history must never share one.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplicaId(u64);

impl ReplicaId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Fresh id in the 32-bit range the CRDT library draws its own ids from.
    pub fn random() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        Self(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReplicaId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ReplicaId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_kind_parse_roundtrip() {
        for kind in [NodeKind::Input, NodeKind::Output, NodeKind::Default, NodeKind::Custom] {
            assert_eq!(kind.to_string().parse::<NodeKind>().unwrap(), kind);
        }
        assert!("sticky".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_node_json_uses_type_key() {
        let node = Node::new("1", NodeKind::Input, 250.0, 0.0).with_data(json!({"label": "Input Node"}));
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "input");
        assert_eq!(value["position"]["x"], 250.0);
        assert_eq!(node.label(), Some("Input Node"));
    }

    #[test]
    fn test_edge_json_camel_case() {
        let edge = Edge::new("e1-2", "1", "2").with_source_handle("a");
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["sourceHandle"], "a");
        assert!(value.get("label").is_none());

        let parsed: Edge = serde_json::from_value(json!({"id": "x", "source": "1", "target": "2"})).unwrap();
        assert!(!parsed.animated);
        assert_eq!(parsed.source_handle, None);
    }

    #[test]
    fn test_replica_random_fits_u32() {
        for _ in 0..32 {
            assert!(ReplicaId::random().get() <= u32::MAX as u64);
        }
        assert_eq!("42".parse::<ReplicaId>().unwrap(), ReplicaId::new(42));
    }
}
