//! Encoded trajectories and training batches

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    interface::{BattleResult, Observation},
};

/// One encoded episode (or episode prefix).
///
/// `observations` holds one more entry than `actions`: the observation after
/// the final action, used for bootstrapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub observations: Vec<Observation>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
    /// Whether the last observation ends the episode
    pub terminal: bool,
}

impl Trajectory {
    pub fn new(
        observations: Vec<Observation>,
        actions: Vec<usize>,
        rewards: Vec<f32>,
        terminal: bool,
    ) -> Result<Self> {
        if actions.len() != rewards.len() || observations.len() != actions.len() + 1 {
            return Err(Error::SerializationContext {
                operation: "assemble trajectory".to_string(),
                message: format!(
                    "{} observations, {} actions, {} rewards",
                    observations.len(),
                    actions.len(),
                    rewards.len()
                ),
            });
        }
        Ok(Self {
            observations,
            actions,
            rewards,
            terminal,
        })
    }

    /// Number of transitions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn total_return(&self) -> f32 {
        self.rewards.iter().sum()
    }
}

/// Where a batch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchSource {
    Offline,
    Online,
}

/// Sequences handed to the learner for one micro-batch.
#[derive(Debug, Clone)]
pub struct TrajectoryBatch {
    pub source: BatchSource,
    pub trajectories: Vec<Trajectory>,
}

impl TrajectoryBatch {
    pub fn new(source: BatchSource, trajectories: Vec<Trajectory>) -> Self {
        Self {
            source,
            trajectories,
        }
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    /// Total transitions across all trajectories
    pub fn transitions(&self) -> usize {
        self.trajectories.iter().map(Trajectory::len).sum()
    }
}

/// Summary of one finished live episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub spec: String,
    pub total_return: f32,
    pub length: usize,
    pub result: Option<BattleResult>,
}
