//! In-memory checkpoint store for testing.
//!
//! This adapter provides a pure in-memory implementation of CheckpointStore,
//! enabling fast tests without any file system I/O.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    Result,
    error::Error,
    ports::{CheckpointStore, TrainingState},
};

/// In-memory checkpoint store.
///
/// Records are kept as MessagePack bytes so that a load goes through the
/// same serialization as the file store.
///
/// # Thread Safety
///
/// All clones share the same underlying storage, so a test can hand one
/// clone to the orchestrator and inspect another.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: Arc<Mutex<BTreeMap<u64, Vec<u8>>>>,
}

impl InMemoryCheckpointStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints
    pub fn count(&self) -> usize {
        self.storage.lock().len()
    }

    /// Stored ordinals in ascending order
    pub fn ordinals(&self) -> Vec<u64> {
        self.storage.lock().keys().copied().collect()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, ordinal: u64, state: &TrainingState) -> Result<()> {
        let bytes = rmp_serde::to_vec(state).map_err(|e| Error::CheckpointWrite {
            ordinal,
            message: e.to_string(),
        })?;

        let mut storage = self.storage.lock();
        if storage.contains_key(&ordinal) {
            return Err(Error::CheckpointExists { ordinal });
        }
        storage.insert(ordinal, bytes);
        Ok(())
    }

    fn load(&self, ordinal: u64) -> Result<TrainingState> {
        let storage = self.storage.lock();
        let bytes = storage
            .get(&ordinal)
            .ok_or(Error::CheckpointNotFound { ordinal })?;

        rmp_serde::from_slice(bytes).map_err(|e| Error::SerializationContext {
            operation: "deserialize checkpoint from in-memory storage".to_string(),
            message: e.to_string(),
        })
    }

    fn latest(&self) -> Result<Option<u64>> {
        Ok(self.storage.lock().keys().next_back().copied())
    }
}
