//! Opponent roster: the fixed set of scripted baseline opponents
//!
//! Opponent identities are plain values; each environment instantiates its
//! own controller from an identity, so no state is shared between
//! environments built from the same identity.

pub mod controllers;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub use controllers::{EmeraldKaizo, Gen1BossAI, Grunt, GymLeader, PokeEnvHeuristic};

use crate::{Error, Result, ports::OpponentController};

/// Opponent identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpponentKind {
    /// Library-style heuristic baseline
    PokeEnvHeuristic,
    /// Format-specific scripted boss
    Gen1BossAI,
    /// Generic low-skill agent
    Grunt,
    /// Generic high-skill agent
    GymLeader,
    /// Specialized strategy agent
    EmeraldKaizo,
}

impl OpponentKind {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            OpponentKind::PokeEnvHeuristic => "PokeEnvHeuristic",
            OpponentKind::Gen1BossAI => "Gen1BossAI",
            OpponentKind::Grunt => "Grunt",
            OpponentKind::GymLeader => "GymLeader",
            OpponentKind::EmeraldKaizo => "EmeraldKaizo",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            OpponentKind::PokeEnvHeuristic => "Damage-maximizing heuristic that bails out of bad matchups",
            OpponentKind::Gen1BossAI => "Scripted boss that favours its strongest move and never switches",
            OpponentKind::Grunt => "Low-skill trainer picking random moves",
            OpponentKind::GymLeader => "High-skill trainer that retreats when low on HP",
            OpponentKind::EmeraldKaizo => "Hard-mode strategist hunting knockouts and matchups",
        }
    }

    /// Create a fresh controller for this identity.
    pub fn instantiate(&self, seed: u64) -> Box<dyn OpponentController> {
        match self {
            OpponentKind::PokeEnvHeuristic => Box::new(PokeEnvHeuristic::new(seed)),
            OpponentKind::Gen1BossAI => Box::new(Gen1BossAI::new(seed)),
            OpponentKind::Grunt => Box::new(Grunt::new(seed)),
            OpponentKind::GymLeader => Box::new(GymLeader::new(seed)),
            OpponentKind::EmeraldKaizo => Box::new(EmeraldKaizo::new(seed)),
        }
    }
}

impl fmt::Display for OpponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpponentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OpponentRoster::baseline()
            .list()
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownOpponent {
                input: s.to_string(),
                expected: OpponentRoster::baseline()
                    .list()
                    .iter()
                    .map(|kind| kind.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Ordered, immutable set of opponents used for live training.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpponentRoster {
    opponents: Vec<OpponentKind>,
}

impl OpponentRoster {
    /// The five baseline opponents, weakest strategy first within each style.
    pub fn baseline() -> Self {
        Self {
            opponents: vec![
                OpponentKind::PokeEnvHeuristic,
                OpponentKind::Gen1BossAI,
                OpponentKind::Grunt,
                OpponentKind::GymLeader,
                OpponentKind::EmeraldKaizo,
            ],
        }
    }

    /// A roster restricted to the given identities, in the given order.
    pub fn custom(opponents: Vec<OpponentKind>) -> Result<Self> {
        if opponents.is_empty() {
            return Err(Error::config("opponent roster cannot be empty"));
        }
        Ok(Self { opponents })
    }

    pub fn list(&self) -> &[OpponentKind] {
        &self.opponents
    }

    pub fn len(&self) -> usize {
        self.opponents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opponents.is_empty()
    }
}

impl Default for OpponentRoster {
    fn default() -> Self {
        Self::baseline()
    }
}
