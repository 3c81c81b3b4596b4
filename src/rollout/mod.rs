//! Live rollout collection across environment specs

pub mod pool;
pub mod worker;

pub use pool::{FaultCounts, RolloutPool};
pub use worker::{Episode, MAX_EPISODE_STEPS, run_episode};
