//! Initial layout used when no persisted canvas exists yet.

use serde_json::json;

use crate::model::{Canvas, Edge, Node, NodeKind};

/// Three nodes, two edges.
pub fn initial_canvas() -> Canvas {
    Canvas {
        nodes: vec![
            Node::new("1", NodeKind::Input, 250.0, 0.0).with_data(json!({ "label": "Input Node" })),
            Node::new("2", NodeKind::Default, 100.0, 100.0).with_data(json!({ "label": "Default Node" })),
            Node::new("3", NodeKind::Output, 400.0, 100.0).with_data(json!({ "label": "Output Node" })),
        ],
        edges: vec![
            Edge::new("e1-2", "1", "2").with_label("this is an edge label"),
            Edge::new("e1-3", "1", "3").animated(),
        ],
    }
}
