//! Process-local slot store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::{SlotStore, StoreError};

/// `HashMap`-backed store. Counts writes so callers can observe how often a
/// slot was actually persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<String, Vec<u8>>>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.read().map(|s| s.contains_key(key)).unwrap_or(false)
    }
}

impl SlotStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let slots = self.slots.read().map_err(|e| StoreError::IoError(e.to_string()))?;
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut slots = self.slots.write().map_err(|e| StoreError::IoError(e.to_string()))?;
        slots.insert(key.to_string(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.write().map_err(|e| StoreError::IoError(e.to_string()))?;
        slots.remove(key);
        Ok(())
    }
}
