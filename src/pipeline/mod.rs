//! Training pipeline
//!
//! This module provides the orchestrator that composes a learner, offline
//! data, live environments, checkpoint storage and metrics sinks into one
//! training run.

pub mod experiment;

pub use experiment::{
    EvalSummary, Experiment, ExperimentBuilder, ExperimentConfig, LOG_INTERVAL_UPDATES,
    ONLINE_BUFFER_EPISODES, ONLINE_REFRESH_UPDATES, Phase, SpecEval, TrainingSummary,
};
