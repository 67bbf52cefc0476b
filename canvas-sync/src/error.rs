use canvas_core::DocumentError;
use thiserror::Error;

use crate::storage::StoreError;

/// Errors surfaced by the reconciler, scheduler and session.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    #[error("session has no document yet; call load() first")]
    NotLoaded,

    #[error("save scheduler is closed")]
    SchedulerClosed,

    #[error("save worker failed: {0}")]
    Worker(String),
}

impl SyncError {
    /// Transient failures the scheduler re-arms with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::StorageUnavailable(_))
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, SyncError::Document(DocumentError::CorruptDocument(_)))
    }
}
