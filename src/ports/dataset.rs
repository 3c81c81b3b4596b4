//! Trajectory source port - sampleable offline data

use crate::{Result, trajectory::TrajectoryBatch};

/// A fixed corpus of trajectories that can be sampled in batches.
pub trait TrajectorySource: Send {
    /// Draw `batch_size` trajectories. No ordering is guaranteed across calls.
    fn sample(&mut self, batch_size: usize) -> Result<TrajectoryBatch>;

    /// Number of trajectories in the corpus
    fn size(&self) -> usize;

    /// Identity of the observation policy used to encode samples
    fn policy_id(&self) -> String;
}
