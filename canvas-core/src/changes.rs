//! Position changes coming from the UI.
//!
//! A batch (one drag-release) is applied as a single [`Document::mutate`]:
//! one new snapshot, one new history entry, nothing in between observable.

use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentError};
use crate::model::Position;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionChange {
    pub node_id: String,
    pub x: f64,
    pub y: f64,
}

impl PositionChange {
    pub fn new(node_id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            node_id: node_id.into(),
            x,
            y,
        }
    }
}

/// Result of applying one batch.
#[derive(Debug, Clone)]
pub struct ChangeOutcome {
    pub document: Document,
    /// Node ids that were moved, in batch order.
    pub applied: Vec<String>,
    /// Node ids not present in the document, or given a non-finite position.
    pub skipped: Vec<String>,
}

/// Apply a batch of position changes. Unknown node ids and non-finite
/// coordinates are skipped.
pub fn apply_changes(doc: &Document, changes: &[PositionChange]) -> Result<Document, DocumentError> {
    apply_changes_with_outcome(doc, changes).map(|outcome| outcome.document)
}

/// Like [`apply_changes`], also reporting which ids were applied or skipped.
///
/// An empty batch records nothing and returns the input snapshot.
pub fn apply_changes_with_outcome(
    doc: &Document,
    changes: &[PositionChange],
) -> Result<ChangeOutcome, DocumentError> {
    if changes.is_empty() {
        return Ok(ChangeOutcome {
            document: doc.clone(),
            applied: Vec::new(),
            skipped: Vec::new(),
        });
    }

    let mut applied = Vec::with_capacity(changes.len());
    let mut skipped = Vec::new();
    let document = doc.mutate(|canvas| {
        for change in changes {
            let position = Position::new(change.x, change.y);
            if !position.is_finite() {
                log::warn!(
                    "Rejected non-finite position for node {}: ({}, {})",
                    change.node_id,
                    change.x,
                    change.y
                );
                skipped.push(change.node_id.clone());
                continue;
            }
            if canvas.set_position(&change.node_id, position) {
                applied.push(change.node_id.clone());
            } else {
                skipped.push(change.node_id.clone());
            }
        }
    })?;

    if !skipped.is_empty() {
        log::debug!("Skipped position changes: {skipped:?}");
    }

    Ok(ChangeOutcome {
        document,
        applied,
        skipped,
    })
}
