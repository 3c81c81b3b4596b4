//! Environment port - the learner-facing reset/step contract

use crate::{
    Result,
    interface::{BattleResult, Observation, UniversalState},
};

/// Outcome of one environment step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f32,
    /// The episode reached a natural end (win, loss or draw)
    pub terminated: bool,
    /// The episode was cut short by a limit
    pub truncated: bool,
    pub result: Option<BattleResult>,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A live, single-agent environment with a uniform discrete action space.
pub trait Environment: Send {
    /// Human-readable identity, e.g. `gen1ou vs Grunt`.
    fn label(&self) -> String;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Observation>;

    /// Advance the episode by one action.
    ///
    /// # Errors
    ///
    /// Returns a retryable error if the underlying session misbehaves.
    fn step(&mut self, action: usize) -> Result<StepResult>;
}

/// Scripted controller that picks actions for the opposing side.
pub trait OpponentController: Send {
    fn name(&self) -> &str;

    /// Choose an action for `state`, seen from the controller's own side.
    ///
    /// Must return one of `state.legal_actions()`.
    fn act(&mut self, state: &UniversalState) -> usize;
}
