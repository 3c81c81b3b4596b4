//! Battle formats, team pools and the scripted battle simulator

pub mod dex;
pub mod format;
pub mod session;
pub mod teams;

pub use dex::{CreatureSpec, Move};
pub use format::{BattleFormat, TRAINING_FORMATS, Tier};
pub use session::{BattleSession, DEFAULT_MAX_TURNS, Side};
pub use teams::{BUILTIN_TEAM_SETS, Team, TeamSet};
