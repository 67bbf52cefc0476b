//! Read-only projection handed to the renderer.
//!
//! The document tolerates edges whose endpoints are gone (a merge can keep an
//! edge while another replica deleted its node). Those are filtered here,
//! never in the document itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Canvas, Edge, Node, NodeKind};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderEdge {
    #[serde(flatten)]
    pub edge: Edge,
    /// Edge style picked from the custom node's `data.selects[sourceHandle]`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct CanvasView {
    pub nodes: Vec<Node>,
    pub edges: Vec<RenderEdge>,
    /// Edges left out because an endpoint is missing.
    #[serde(skip)]
    pub dangling: usize,
}

impl CanvasView {
    pub fn project(canvas: &Canvas) -> Self {
        let selects = canvas
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Custom)
            .and_then(|n| n.data.get("selects"));

        let mut dangling = 0;
        let mut edges = Vec::with_capacity(canvas.edges.len());
        for edge in &canvas.edges {
            if canvas.node(&edge.source).is_none() || canvas.node(&edge.target).is_none() {
                log::debug!(
                    "Dropping dangling edge {} ({} -> {}) from view",
                    edge.id,
                    edge.source,
                    edge.target
                );
                dangling += 1;
                continue;
            }
            let edge_type = edge
                .source_handle
                .as_deref()
                .and_then(|handle| selects.and_then(|s| s.get(handle)))
                .and_then(Value::as_str)
                .map(str::to_string);
            edges.push(RenderEdge {
                edge: edge.clone(),
                edge_type,
            });
        }

        Self {
            nodes: canvas.nodes.clone(),
            edges,
            dangling,
        }
    }
}
