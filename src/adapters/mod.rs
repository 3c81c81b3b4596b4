//! Adapters implementing domain ports.
//!
//! This module contains infrastructure implementations of the traits defined
//! in the ports module. Following hexagonal architecture, adapters depend on
//! domain ports, not the other way around.

pub mod in_memory_checkpoints;
pub mod linear_learner;
pub mod metrics;
pub mod msgpack_checkpoints;

pub use in_memory_checkpoints::InMemoryCheckpointStore;
pub use linear_learner::{LinearLearner, LinearLearnerConfig};
pub use metrics::{JsonlMetricsSink, MemoryLog, MemorySink, ProgressSink};
pub use msgpack_checkpoints::MsgPackCheckpointStore;
