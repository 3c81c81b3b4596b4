//! Ports (trait boundaries) for external collaborators.
//!
//! This module defines the interfaces between the training orchestrator and
//! the pieces it composes: learner, environments, opponents, offline data,
//! checkpoint storage and metrics tracking. Implementations live in
//! `adapters` and the domain modules.

pub mod checkpoint;
pub mod dataset;
pub mod environment;
pub mod learner;
pub mod metrics;

pub use checkpoint::{CheckpointRecord, CheckpointStore, TrainingState};
pub use dataset::TrajectorySource;
pub use environment::{Environment, OpponentController, StepResult};
pub use learner::{Learner, LearnerState, LossReport, Policy};
pub use metrics::{Metrics, MetricsSink};
