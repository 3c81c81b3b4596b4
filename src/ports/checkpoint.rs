//! Checkpoint port for learner persistence.
//!
//! This module defines the trait boundary between the training loop and the
//! storage of checkpoint records.

use serde::{Deserialize, Serialize};

use super::learner::LearnerState;
use crate::Result;

/// Everything needed to resume training from a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub learner: LearnerState,
    /// Epoch that was completed when the state was captured
    pub epoch: u64,
    /// Training batches consumed so far (micro-batches)
    pub train_batches: u64,
}

/// A stored checkpoint: an ordinal and the state saved under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub ordinal: u64,
    pub state: TrainingState,
}

/// Port for persisting and loading checkpoints by ordinal.
///
/// Records are append-only: an ordinal is written once and only ever
/// superseded by a larger one.
///
/// # Examples
///
/// ```
/// use metamon::adapters::InMemoryCheckpointStore;
/// use metamon::ports::CheckpointStore;
///
/// let store = InMemoryCheckpointStore::new();
/// assert_eq!(store.latest()?, None);
/// # Ok::<(), metamon::Error>(())
/// ```
pub trait CheckpointStore: Send {
    /// Persist `state` under `ordinal`.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointExists` if the ordinal was already written, or
    /// `CheckpointWrite` if the record could not be stored intact.
    fn save(&self, ordinal: u64, state: &TrainingState) -> Result<()>;

    /// Load the state saved under `ordinal`.
    ///
    /// # Errors
    ///
    /// Returns `CheckpointNotFound` if no record exists for the ordinal.
    fn load(&self, ordinal: u64) -> Result<TrainingState>;

    /// Largest saved ordinal, or `None` for a fresh run.
    fn latest(&self) -> Result<Option<u64>>;
}
