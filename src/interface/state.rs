//! Format-agnostic battle state shared by replays and live sessions

use serde::{Deserialize, Serialize};

/// Number of discrete actions: four move slots followed by five switch slots.
pub const ACTION_SPACE: usize = 9;

/// First action index that denotes a switch.
pub const SWITCH_OFFSET: usize = 4;

/// Outcome of a finished battle from the observing side's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleResult {
    Won,
    Lost,
    Draw,
}

impl BattleResult {
    /// Same result seen from the other side
    pub fn flipped(self) -> Self {
        match self {
            BattleResult::Won => BattleResult::Lost,
            BattleResult::Lost => BattleResult::Won,
            BattleResult::Draw => BattleResult::Draw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversalMove {
    pub name: String,
    pub power: u16,
    pub accuracy: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversalPokemon {
    pub name: String,
    /// Remaining HP as a fraction of max HP
    pub hp_pct: f32,
    pub base_hp: u16,
    pub base_atk: u16,
    pub base_def: u16,
    pub base_spe: u16,
    pub moves: Vec<UniversalMove>,
}

impl UniversalPokemon {
    pub fn is_fainted(&self) -> bool {
        self.hp_pct <= 0.0
    }
}

/// One decision point as seen by one side of a battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversalState {
    pub format: String,
    pub turn: u32,
    pub player_active: UniversalPokemon,
    pub opponent_active: UniversalPokemon,
    /// Healthy benched creatures, in switch-slot order
    pub available_switches: Vec<UniversalPokemon>,
    /// Sum of HP fractions over the whole party
    pub player_hp_total: f32,
    pub opponent_hp_total: f32,
    pub player_remaining: u8,
    pub opponent_remaining: u8,
    pub outcome: Option<BattleResult>,
}

impl UniversalState {
    /// Action indices that are legal in this state.
    pub fn legal_actions(&self) -> Vec<usize> {
        if self.outcome.is_some() {
            return Vec::new();
        }
        let moves = if self.player_active.is_fainted() {
            0
        } else {
            self.player_active.moves.len()
        };
        (0..moves)
            .chain((0..self.available_switches.len()).map(|slot| SWITCH_OFFSET + slot))
            .filter(|&action| action < ACTION_SPACE)
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}
