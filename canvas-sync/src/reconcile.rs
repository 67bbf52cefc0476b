//! Load → merge → verify → write, against a single storage slot.
//!
//! The stored blob is never overwritten blindly: whatever another process
//! persisted is merged into the local snapshot first. The only unmerged
//! write is the very first one, into an empty slot.

use std::sync::Arc;

use canvas_core::{Document, Position};

use crate::error::SyncError;
use crate::storage::SlotStore;

/// A node whose position changed across serialize → deserialize.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTripDivergence {
    /// Index in display order.
    pub index: usize,
    pub node_id: String,
    pub merged: Position,
    pub reloaded: Position,
}

/// Result of one reconciliation.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The snapshot that was written (merged, with the local replica id).
    pub document: Document,
    /// True when the slot was empty and the local snapshot was written as-is.
    pub first_write: bool,
    pub divergences: Vec<RoundTripDivergence>,
    pub bytes_written: usize,
}

/// Reconciles local snapshots with one storage slot.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn SlotStore>,
    slot: String,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SlotStore>, slot: impl Into<String>) -> Self {
        Self {
            store,
            slot: slot.into(),
        }
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Read and decode the slot. `Ok(None)` means nothing was ever saved.
    pub fn load(&self) -> Result<Option<Document>, SyncError> {
        match self.store.get(&self.slot)? {
            Some(bytes) => Ok(Some(Document::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Merge `local` with whatever is stored and write the result back.
    ///
    /// Blocking: performs storage I/O. A corrupt stored blob aborts the save
    /// and leaves the slot untouched.
    pub fn reconcile(&self, local: &Document) -> Result<Reconciled, SyncError> {
        let stored_bytes = self.store.get(&self.slot)?;

        let Some(stored_bytes) = stored_bytes else {
            let bytes = local.serialize()?;
            self.store.set(&self.slot, &bytes)?;
            log::info!(
                "First save into slot '{}': {} nodes, {} bytes",
                self.slot,
                local.nodes().len(),
                bytes.len()
            );
            return Ok(Reconciled {
                document: local.clone(),
                first_write: true,
                divergences: Vec::new(),
                bytes_written: bytes.len(),
            });
        };

        let stored = Document::deserialize(&stored_bytes)?;
        let merged = local.merge(&stored)?;

        let bytes = merged.serialize()?;
        let reloaded = Document::deserialize(&bytes)?;
        let divergences = verify_round_trip(&merged, &reloaded);
        for d in &divergences {
            log::warn!(
                "Round-trip divergence at node #{} ('{}'): merged ({}, {}) reloaded ({}, {})",
                d.index,
                d.node_id,
                d.merged.x,
                d.merged.y,
                d.reloaded.x,
                d.reloaded.y
            );
        }

        self.store.set(&self.slot, &bytes)?;
        log::debug!(
            "Reconciled slot '{}': history {} -> {}, {} bytes",
            self.slot,
            stored.history_len(),
            merged.history_len(),
            bytes.len()
        );

        Ok(Reconciled {
            document: merged,
            first_write: false,
            divergences,
            bytes_written: bytes.len(),
        })
    }
}

/// Compare node positions index by index.
pub fn verify_round_trip(merged: &Document, reloaded: &Document) -> Vec<RoundTripDivergence> {
    let (a, b) = (merged.nodes(), reloaded.nodes());
    if a.len() != b.len() {
        log::warn!(
            "Round-trip node count mismatch: merged {} reloaded {}",
            a.len(),
            b.len()
        );
    }

    a.iter()
        .zip(b.iter())
        .enumerate()
        .filter(|(_, (m, r))| m.position != r.position)
        .map(|(index, (m, r))| RoundTripDivergence {
            index,
            node_id: m.id.clone(),
            merged: m.position,
            reloaded: r.position,
        })
        .collect()
}
