//! Config resolver: CLI flags, architecture presets and objective weights

pub mod arch;
pub mod objective;
pub mod run;

pub use arch::{ArchPreset, ArchSize};
pub use objective::{FilterFunc, ObjectiveWeights, REWARD_MULTIPLIER, TAU};
pub use run::{EnvRuntime, RunArgs, RunConfig, Schedule};
pub(crate) use run::parse_list;
