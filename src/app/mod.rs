//! Application layer with dependency injection container.
//!
//! The container owns a resolved run configuration and builds the adapters
//! the orchestrator composes.
//!
//! ```text
//! RunConfig ──▶ App ──┬─▶ LinearLearner            (ports::Learner)
//!                     ├─▶ ParsedReplayDataset      (ports::TrajectorySource)
//!                     ├─▶ EnvFactory per spec      (ports::Environment)
//!                     ├─▶ MsgPackCheckpointStore   (ports::CheckpointStore)
//!                     └─▶ ProgressSink, JSONL log  (ports::MetricsSink)
//!                               │
//!                               ▼
//!                          Experiment
//! ```

pub mod container;

pub use container::{App, AppBuilder, CHECKPOINT_DIR, METRICS_FILE};
