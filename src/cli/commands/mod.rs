//! Subcommand implementations

pub mod envs;
pub mod record;
pub mod train;
