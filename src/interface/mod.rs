//! Observation and reward policies shared by live play and offline replays
//!
//! An [`ObservationPolicy`] pairs an observation space with a reward
//! function. The same policy must encode the offline corpus and the live
//! environments; [`ObservationPolicy::id`] is what the orchestrator compares
//! to enforce that.

pub mod observation;
pub mod reward;
pub mod state;
pub mod tokenizer;

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

pub use observation::{
    DefaultObservationSpace, ExpandedObservationSpace, Observation, ObservationSpace,
    TextObservation, TextObservationSpace, TokenizedObservationSpace,
};
pub use reward::{BinaryReward, DefaultShapedReward, RewardFunction};
pub use state::{
    ACTION_SPACE, BattleResult, SWITCH_OFFSET, UniversalMove, UniversalPokemon, UniversalState,
};
pub use tokenizer::{Tokenizer, TokenizerId};

use crate::{Error, Result};

/// Observation space identifiers accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationSpaceKind {
    Default,
    Expanded,
}

impl ObservationSpaceKind {
    pub const ALL: [ObservationSpaceKind; 2] =
        [ObservationSpaceKind::Default, ObservationSpaceKind::Expanded];

    pub fn name(&self) -> &'static str {
        match self {
            ObservationSpaceKind::Default => "DefaultObservationSpace",
            ObservationSpaceKind::Expanded => "ExpandedObservationSpace",
        }
    }

    fn instantiate(&self) -> Box<dyn TextObservationSpace> {
        match self {
            ObservationSpaceKind::Default => Box::new(DefaultObservationSpace),
            ObservationSpaceKind::Expanded => Box::new(ExpandedObservationSpace),
        }
    }
}

impl FromStr for ObservationSpaceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| Error::UnknownObservationSpace {
                input: s.to_string(),
                expected: Self::ALL.map(|kind| kind.name()).join(", "),
            })
    }
}

/// Reward function identifiers accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardKind {
    DefaultShaped,
    Binary,
}

impl RewardKind {
    pub const ALL: [RewardKind; 2] = [RewardKind::DefaultShaped, RewardKind::Binary];

    pub fn name(&self) -> &'static str {
        match self {
            RewardKind::DefaultShaped => "DefaultShapedReward",
            RewardKind::Binary => "BinaryReward",
        }
    }

    fn instantiate(&self) -> Arc<dyn RewardFunction> {
        match self {
            RewardKind::DefaultShaped => Arc::new(DefaultShapedReward),
            RewardKind::Binary => Arc::new(BinaryReward),
        }
    }
}

impl FromStr for RewardKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| Error::UnknownRewardFunction {
                input: s.to_string(),
                expected: Self::ALL.map(|kind| kind.name()).join(", "),
            })
    }
}

/// Observation encoder and reward function applied to every transition.
///
/// Cheap to clone; clones share the underlying strategy objects.
#[derive(Clone)]
pub struct ObservationPolicy {
    space: Arc<dyn ObservationSpace>,
    reward: Arc<dyn RewardFunction>,
}

impl ObservationPolicy {
    /// Resolve identifiers into concrete strategies once.
    pub fn new(space: ObservationSpaceKind, reward: RewardKind, tokenizer: TokenizerId) -> Self {
        Self {
            space: Arc::new(TokenizedObservationSpace::new(
                space.instantiate(),
                Tokenizer::new(tokenizer),
            )),
            reward: reward.instantiate(),
        }
    }

    pub fn from_parts(space: Arc<dyn ObservationSpace>, reward: Arc<dyn RewardFunction>) -> Self {
        Self { space, reward }
    }

    pub fn encode(&self, state: &UniversalState) -> Observation {
        self.space.encode(state)
    }

    pub fn reward(&self, previous: &UniversalState, next: &UniversalState) -> f32 {
        self.reward.reward(previous, next)
    }

    pub fn feature_dim(&self) -> usize {
        self.space.feature_dim()
    }

    /// Identity of the encoding, e.g. `DefaultObservationSpace[allreplays-v3]+DefaultShapedReward`
    pub fn id(&self) -> String {
        format!("{}+{}", self.space.id(), self.reward.name())
    }
}

impl fmt::Debug for ObservationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObservationPolicy").field(&self.id()).finish()
    }
}

impl Default for ObservationPolicy {
    fn default() -> Self {
        Self::new(
            ObservationSpaceKind::Default,
            RewardKind::DefaultShaped,
            TokenizerId::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pokemon(name: &str, hp_pct: f32) -> UniversalPokemon {
        UniversalPokemon {
            name: name.to_string(),
            hp_pct,
            base_hp: 100,
            base_atk: 100,
            base_def: 100,
            base_spe: 100,
            moves: vec![UniversalMove {
                name: "Body Slam".to_string(),
                power: 85,
                accuracy: 100,
            }],
        }
    }

    fn state(player_total: f32, opponent_total: f32, outcome: Option<BattleResult>) -> UniversalState {
        UniversalState {
            format: "gen1ou".to_string(),
            turn: 3,
            player_active: pokemon("Tauros", 1.0),
            opponent_active: pokemon("Snorlax", 0.5),
            available_switches: vec![pokemon("Chansey", 1.0)],
            player_hp_total: player_total,
            opponent_hp_total: opponent_total,
            player_remaining: 6,
            opponent_remaining: 6,
            outcome,
        }
    }

    #[test]
    fn test_encoding_is_deterministic_and_sized() {
        let policy = ObservationPolicy::default();
        let s = state(6.0, 5.5, None);
        let a = policy.encode(&s);
        let b = policy.encode(&s);
        assert_eq!(a, b);
        assert_eq!(a.numbers.len(), policy.feature_dim());
        assert!(!a.tokens.is_empty());

        let expanded = ObservationPolicy::new(
            ObservationSpaceKind::Expanded,
            RewardKind::DefaultShaped,
            TokenizerId::default(),
        );
        assert_eq!(expanded.encode(&s).numbers.len(), expanded.feature_dim());
        assert!(expanded.feature_dim() > policy.feature_dim());
    }

    #[test]
    fn test_shaped_reward_tracks_damage_and_victory() {
        let policy = ObservationPolicy::default();
        let before = state(6.0, 6.0, None);
        let after = state(6.0, 5.5, None);
        assert!((policy.reward(&before, &after) - 0.5).abs() < 1e-6);

        let won = state(6.0, 5.5, Some(BattleResult::Won));
        assert!(policy.reward(&before, &won) > 100.0);
    }

    #[test]
    fn test_binary_reward_ignores_shaping() {
        let policy = ObservationPolicy::new(
            ObservationSpaceKind::Default,
            RewardKind::Binary,
            TokenizerId::default(),
        );
        let before = state(6.0, 6.0, None);
        assert_eq!(policy.reward(&before, &state(5.0, 4.0, None)), 0.0);
        assert_eq!(
            policy.reward(&before, &state(0.0, 4.0, Some(BattleResult::Lost))),
            -100.0
        );
    }

    #[test]
    fn test_policy_identity_distinguishes_components() {
        let default = ObservationPolicy::default();
        let other_tokenizer = ObservationPolicy::new(
            ObservationSpaceKind::Default,
            RewardKind::DefaultShaped,
            TokenizerId::AllReplaysV1,
        );
        assert_ne!(default.id(), other_tokenizer.id());
        assert_eq!(default.id(), ObservationPolicy::default().id());
        assert!(default.id().contains("allreplays-v3"));
    }

    #[test]
    fn test_legal_actions_include_moves_and_switches() {
        let s = state(6.0, 6.0, None);
        assert_eq!(s.legal_actions(), vec![0, SWITCH_OFFSET]);
        let done = state(6.0, 0.0, Some(BattleResult::Won));
        assert!(done.legal_actions().is_empty());
    }
}
