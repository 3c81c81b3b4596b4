//! Offline and online training for battle agents
//!
//! This crate provides:
//! - A deterministic turn-based battle simulator with scripted opponents
//! - Observation, tokenization and reward interfaces shared by replays and
//!   live play
//! - A parsed-replay corpus reader and self-play recorder
//! - A worker pool that collects rollouts from every (format, opponent) pair
//! - A training orchestrator with gradient accumulation, target smoothing,
//!   periodic evaluation and append-only checkpoints

pub mod adapters;
pub mod app;
pub mod battle;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod env;
pub mod error;
pub mod interface;
pub mod opponents;
pub mod pipeline;
pub mod ports;
pub mod rollout;
pub mod trajectory;

pub use battle::{BattleFormat, TeamSet};
pub use config::{RunArgs, RunConfig};
pub use env::{EnvFactory, EnvironmentSpec};
pub use error::{Error, Result};
pub use interface::ObservationPolicy;
pub use opponents::{OpponentKind, OpponentRoster};
pub use pipeline::{Experiment, Phase, TrainingSummary};
