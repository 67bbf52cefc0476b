//! One editing session over one storage slot.
//!
//! Holds the authoritative in-memory snapshot, publishes the render view,
//! and hands every change to the [`SaveScheduler`]. Snapshots written by the
//! scheduler are folded back in by CRDT merge before the next change, never
//! by replacement.

use std::sync::Arc;

use canvas_core::{
    apply_changes_with_outcome, initial_canvas, CanvasView, ChangeOutcome, Document, Edge,
    PositionChange, ReplicaId,
};
use tokio::sync::watch;

use crate::error::SyncError;
use crate::reconcile::Reconciler;
use crate::scheduler::{run_blocking, SaveScheduler, SaveStatus, SchedulerConfig};
use crate::storage::SlotStore;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Storage slot holding the canvas (default: "canvas")
    pub slot_key: String,
    /// Replica id for local edits (default: random per session)
    pub replica: Option<ReplicaId>,
    pub scheduler: SchedulerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slot_key: "canvas".to_string(),
            replica: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn for_testing() -> Self {
        Self {
            scheduler: SchedulerConfig::for_testing(),
            ..Self::default()
        }
    }

    pub fn with_replica(mut self, replica: ReplicaId) -> Self {
        self.replica = Some(replica);
        self
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot_key = slot.into();
        self
    }

    /// Slot that receives a corrupt blob on [`CanvasSession::recover_fresh`].
    pub fn quarantine_key(&self) -> String {
        format!("{}.corrupt", self.slot_key)
    }
}

/// What the UI renders.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    /// No document yet.
    Loading,
    Ready(CanvasView),
}

impl ViewState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ViewState::Ready(_))
    }

    pub fn as_ready(&self) -> Option<&CanvasView> {
        match self {
            ViewState::Ready(view) => Some(view),
            ViewState::Loading => None,
        }
    }
}

/// How [`CanvasSession::load`] obtained its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Slot was empty; started from the seed layout.
    FirstRun,
    /// Decoded from the slot.
    Restored,
}

pub struct CanvasSession {
    config: SessionConfig,
    store: Arc<dyn SlotStore>,
    reconciler: Reconciler,
    scheduler: SaveScheduler,
    reconciled: watch::Receiver<Option<Document>>,
    document: Option<Document>,
    view: watch::Sender<ViewState>,
}

impl CanvasSession {
    /// New session in the `Loading` state. Must be called inside a Tokio
    /// runtime; spawns the save worker.
    pub fn new(store: Arc<dyn SlotStore>, config: SessionConfig) -> Self {
        let reconciler = Reconciler::new(store.clone(), config.slot_key.clone());
        let scheduler = SaveScheduler::spawn(reconciler.clone(), config.scheduler.clone());
        let reconciled = scheduler.reconciled();
        let (view, _) = watch::channel(ViewState::Loading);

        Self {
            config,
            store,
            reconciler,
            scheduler,
            reconciled,
            document: None,
            view,
        }
    }

    /// Read the slot. An empty slot starts from the seed layout and schedules
    /// its first save. A corrupt slot is an error and the session stays
    /// `Loading`; see [`CanvasSession::recover_fresh`].
    pub async fn load(&mut self) -> Result<LoadOutcome, SyncError> {
        let reconciler = self.reconciler.clone();
        let stored = run_blocking(move || reconciler.load()).await;

        let stored = match stored {
            Ok(stored) => stored,
            Err(e) => {
                if e.is_corrupt() {
                    log::error!("Slot '{}' holds a corrupt document: {e}", self.config.slot_key);
                }
                return Err(e);
            }
        };

        let replica = self.config.replica.unwrap_or_else(ReplicaId::random);
        match stored {
            Some(document) => {
                let document = document.with_replica(replica);
                log::info!(
                    "Restored canvas from '{}': {} nodes, {} edges, history {}",
                    self.config.slot_key,
                    document.nodes().len(),
                    document.edges().len(),
                    document.history_len()
                );
                self.install(document);
                Ok(LoadOutcome::Restored)
            }
            None => {
                log::info!("Slot '{}' is empty, starting from seed", self.config.slot_key);
                self.start_fresh(replica)?;
                Ok(LoadOutcome::FirstRun)
            }
        }
    }

    /// Move whatever sits in the slot to the quarantine slot and start over
    /// from the seed layout under a fresh random replica id, as
    /// [`CanvasSession::reset`] does. This discards the stored document.
    pub async fn recover_fresh(&mut self) -> Result<(), SyncError> {
        self.scheduler.cancel().await?;

        let store = self.store.clone();
        let slot = self.config.slot_key.clone();
        let quarantine = self.config.quarantine_key();
        let moved = run_blocking(move || {
            let Some(bytes) = store.get(&slot)? else {
                return Ok(0);
            };
            store.set(&quarantine, &bytes)?;
            store.delete(&slot)?;
            Ok(bytes.len())
        })
        .await?;

        if moved > 0 {
            log::warn!(
                "Quarantined {moved} bytes from '{}' to '{}'",
                self.config.slot_key,
                self.config.quarantine_key()
            );
        }

        self.mark_reconciled_seen();
        self.start_fresh(ReplicaId::random())
    }

    /// Apply one batch of position changes and schedule a save.
    pub fn apply_changes(&mut self, changes: &[PositionChange]) -> Result<ChangeOutcome, SyncError> {
        let current = self.current()?;
        let outcome = apply_changes_with_outcome(&current, changes)?;
        if changes.is_empty() {
            // nothing to save, but keep whatever was merged in
            self.install(outcome.document.clone());
            return Ok(outcome);
        }
        self.commit(outcome.document.clone())?;
        Ok(outcome)
    }

    /// Add (or replace) an edge.
    pub fn connect(&mut self, edge: Edge) -> Result<(), SyncError> {
        let current = self.current()?;
        let mut added = Ok(());
        let next = current.mutate(|canvas| added = canvas.add_edge(edge))?;
        added?;
        self.commit(next)
    }

    /// Remove an edge. `Ok(false)` when it did not exist.
    pub fn disconnect(&mut self, edge_id: &str) -> Result<bool, SyncError> {
        let current = self.current()?;
        if current.canvas().edge(edge_id).is_none() {
            return Ok(false);
        }
        let next = current.mutate(|canvas| {
            canvas.remove_edge(edge_id);
        })?;
        self.commit(next)?;
        Ok(true)
    }

    /// Fold in the latest saved snapshot and republish the view. Returns
    /// whether anything new was merged.
    pub fn refresh(&mut self) -> Result<bool, SyncError> {
        let Some(before) = self.document.clone() else {
            return Err(SyncError::NotLoaded);
        };
        let after = self.current()?;
        let changed = after != before;
        if changed {
            self.install(after);
        }
        Ok(changed)
    }

    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    pub fn is_saving(&self) -> bool {
        self.scheduler.is_saving()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.scheduler.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.scheduler.subscribe()
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Delete the slot and restart from the seed layout under a fresh
    /// replica id.
    pub async fn reset(&mut self) -> Result<(), SyncError> {
        self.scheduler.cancel().await?;

        let store = self.store.clone();
        let slot = self.config.slot_key.clone();
        run_blocking(move || store.delete(&slot).map_err(SyncError::from)).await?;
        log::info!("Slot '{}' cleared", self.config.slot_key);

        self.mark_reconciled_seen();
        self.start_fresh(ReplicaId::random())
    }

    /// Save the pending snapshot now.
    pub async fn flush(&self) -> Result<bool, SyncError> {
        self.scheduler.flush().await
    }

    /// Save pending work and stop the save worker.
    pub async fn shutdown(self) -> Result<(), SyncError> {
        self.scheduler.shutdown().await
    }

    /// Local snapshot with any newer saved snapshot merged in.
    fn current(&mut self) -> Result<Document, SyncError> {
        let local = self.document.clone().ok_or(SyncError::NotLoaded)?;
        if !self.reconciled.has_changed().unwrap_or(false) {
            return Ok(local);
        }
        let saved = self.reconciled.borrow_and_update().clone();
        match saved {
            Some(saved) => Ok(local.merge(&saved)?),
            None => Ok(local),
        }
    }

    fn commit(&mut self, document: Document) -> Result<(), SyncError> {
        self.install(document.clone());
        self.scheduler.schedule(document)
    }

    fn start_fresh(&mut self, replica: ReplicaId) -> Result<(), SyncError> {
        let document = Document::create(initial_canvas(), replica)?;
        self.commit(document)
    }

    fn install(&mut self, document: Document) {
        let view = CanvasView::project(document.canvas());
        self.document = Some(document);
        self.view.send_replace(ViewState::Ready(view));
    }

    /// Saved snapshots from before a reset must not be merged back in.
    fn mark_reconciled_seen(&mut self) {
        self.reconciled.borrow_and_update();
    }
}
