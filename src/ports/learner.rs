//! Learner port - abstraction over the gradient-based learner
//!
//! The orchestrator drives a learner through micro-batch accumulation,
//! optimizer steps and target-network smoothing without knowing how
//! gradients are computed.

use std::{collections::BTreeMap, sync::Arc};

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::{Result, interface::Observation, trajectory::TrajectoryBatch};

/// Read-only acting policy used during rollout collection.
///
/// Snapshots are immutable, so workers may act with one while the learner
/// accumulates the next step's gradients.
pub trait Policy: Send + Sync {
    /// Pick an action index in `0..ACTION_SPACE`.
    fn act(&self, observation: &Observation, rng: &mut StdRng) -> usize;
}

/// Loss statistics for one accumulated micro-batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossReport {
    pub actor_loss: f64,
    pub critic_loss: f64,
    /// Fraction of transitions the filter accepted (weighted)
    pub filter_rate: f64,
    pub transitions: usize,
}

/// Serializable learner parameters and optimizer progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerState {
    /// Learner implementation that produced the state
    pub kind: String,
    pub optimizer_steps: u64,
    pub tensors: BTreeMap<String, Vec<f32>>,
}

/// Learner trait - the training side of an agent
pub trait Learner: Send {
    /// Get the learner's name.
    fn name(&self) -> &str;

    /// Add the gradient of `weight * loss(batch)` to the pending update.
    ///
    /// A weight of zero still evaluates the loss for reporting but leaves
    /// the pending gradient unchanged.
    fn accumulate(&mut self, batch: &TrajectoryBatch, weight: f64) -> Result<LossReport>;

    /// Apply the pending gradient as one optimizer step and clear it.
    ///
    /// Returns the (pre-clipping) gradient norm.
    fn apply_update(&mut self) -> Result<f64>;

    /// Polyak-average the online parameters into the target copy:
    /// `target = tau * online + (1 - tau) * target`.
    fn soft_update_target(&mut self, tau: f64);

    /// Immutable snapshot of the current acting policy.
    fn policy(&self) -> Arc<dyn Policy>;

    /// Snapshot all parameters for checkpointing.
    fn state(&self) -> LearnerState;

    /// Replace parameters with a previously saved snapshot.
    fn restore(&mut self, state: LearnerState) -> Result<()>;

    /// Number of optimizer steps applied so far.
    fn optimizer_steps(&self) -> u64;

    /// Seed any internal randomness (e.g. augmentation).
    ///
    /// # Default Implementation
    ///
    /// Does nothing and returns `Ok(())`.
    fn set_rng_seed(&mut self, _seed: u64) -> Result<()> {
        Ok(())
    }
}
