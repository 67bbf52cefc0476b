//! # canvas-sync: Persistence layer for the canvas document
//!
//! Keeps one canvas document in sync with one storage slot, shared by every
//! process that opens the same store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  apply_changes   ┌───────────────┐
//! │ UI           │ ───────────────► │ CanvasSession │ ── ViewState (watch)
//! └──────────────┘                  └───────┬───────┘
//!                                           │ schedule(doc)
//!                                           ▼
//!                                   ┌───────────────┐
//!                                   │ SaveScheduler │  debounce, single flight,
//!                                   │ (worker task) │  retry with backoff
//!                                   └───────┬───────┘
//!                                           │ spawn_blocking
//!                                           ▼
//!                                   ┌───────────────┐    get/set    ┌───────────┐
//!                                   │ Reconciler    │ ────────────► │ SlotStore │
//!                                   │ load→merge→   │               └───────────┘
//!                                   │ verify→write  │
//!                                   └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: `SlotStore` trait, RocksDB and in-memory stores
//! - [`reconcile`]: merge-before-write against the stored blob
//! - [`scheduler`]: debounced background saves with observable status
//! - [`session`]: in-memory authority, render view, reset/recovery

pub mod error;
pub mod reconcile;
pub mod scheduler;
pub mod session;
pub mod storage;

// Re-exports for convenience
pub use error::SyncError;
pub use reconcile::{verify_round_trip, Reconciled, Reconciler, RoundTripDivergence};
pub use scheduler::{SaveScheduler, SaveStatus, SchedulerConfig};
pub use session::{CanvasSession, LoadOutcome, SessionConfig, ViewState};
pub use storage::{MemoryStore, RocksStore, SlotMetadata, SlotStore, StoreConfig, StoreError};
