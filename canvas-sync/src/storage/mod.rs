//! Slot storage for the persisted canvas blob.
//!
//! Architecture:
//! ```text
//! ┌─────────────┐   get / set / delete   ┌──────────────────────────────┐
//! │ Reconciler  │ ─────────────────────► │ SlotStore                    │
//! │ Session     │                        │  ├── RocksStore (durable)    │
//! └─────────────┘                        │  └── MemoryStore (in-proc)   │
//!                                        └──────────────────────────────┘
//! ```
//!
//! A slot holds exactly one opaque blob. The store never looks inside it;
//! merging is the reconciler's job.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::{RocksStore, SlotMetadata, StoreConfig};

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// RocksDB internal error
    DatabaseError(String),
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
    /// Compression error
    CompressionError(String),
    /// I/O error
    IoError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
            StoreError::IoError(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// Key/value slot storage.
pub trait SlotStore: Send + Sync {
    /// Read a slot. `Ok(None)` means the slot was never written (or reset).
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the slot's content.
    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Remove the slot. Removing an absent slot is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
