//! Reward functions over consecutive battle states

use super::state::{BattleResult, UniversalState};

/// Bonus for winning (and penalty for losing) a battle
pub const VICTORY_BONUS: f32 = 100.0;

pub trait RewardFunction: Send + Sync {
    fn name(&self) -> &'static str;

    fn reward(&self, previous: &UniversalState, next: &UniversalState) -> f32;
}

fn terminal_bonus(next: &UniversalState) -> f32 {
    match next.outcome {
        Some(BattleResult::Won) => VICTORY_BONUS,
        Some(BattleResult::Lost) => -VICTORY_BONUS,
        Some(BattleResult::Draw) | None => 0.0,
    }
}

/// Damage dealt minus damage taken, plus knockouts, plus the victory bonus.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultShapedReward;

impl RewardFunction for DefaultShapedReward {
    fn name(&self) -> &'static str {
        "DefaultShapedReward"
    }

    fn reward(&self, previous: &UniversalState, next: &UniversalState) -> f32 {
        let damage_done = previous.opponent_hp_total - next.opponent_hp_total;
        let damage_taken = previous.player_hp_total - next.player_hp_total;
        let knocked_out =
            f32::from(previous.opponent_remaining) - f32::from(next.opponent_remaining);
        let lost = f32::from(previous.player_remaining) - f32::from(next.player_remaining);
        (damage_done - damage_taken) + (knocked_out - lost) + terminal_bonus(next)
    }
}

/// Sparse win/loss signal only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryReward;

impl RewardFunction for BinaryReward {
    fn name(&self) -> &'static str {
        "BinaryReward"
    }

    fn reward(&self, _previous: &UniversalState, next: &UniversalState) -> f32 {
        terminal_bonus(next)
    }
}
