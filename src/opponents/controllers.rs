//! Scripted opponent controllers
//!
//! Every controller owns its RNG and holds no state shared with any other
//! controller, so concurrent environments never interfere.

use rand::{Rng, SeedableRng, prelude::IndexedRandom, rngs::StdRng};

use crate::{
    interface::{SWITCH_OFFSET, UniversalPokemon, UniversalState},
    ports::OpponentController,
};

/// Expected damage proxy for one move against one defender.
fn expected_damage(attacker: &UniversalPokemon, slot: usize, defender: &UniversalPokemon) -> f32 {
    let m = &attacker.moves[slot];
    f32::from(m.power) * f32::from(m.accuracy) / 100.0 * f32::from(attacker.base_atk)
        / f32::from(defender.base_def).max(1.0)
}

fn legal_moves(state: &UniversalState) -> Vec<usize> {
    state
        .legal_actions()
        .into_iter()
        .filter(|&action| action < SWITCH_OFFSET)
        .collect()
}

fn best_move(state: &UniversalState) -> Option<usize> {
    legal_moves(state).into_iter().max_by(|&a, &b| {
        expected_damage(&state.player_active, a, &state.opponent_active)
            .total_cmp(&expected_damage(&state.player_active, b, &state.opponent_active))
    })
}

/// Switch slot of the healthiest bench member
fn healthiest_switch(state: &UniversalState) -> Option<usize> {
    state
        .available_switches
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.hp_pct.total_cmp(&b.hp_pct))
        .map(|(slot, _)| SWITCH_OFFSET + slot)
}

fn fallback(state: &UniversalState, rng: &mut StdRng) -> usize {
    state.legal_actions().choose(rng).copied().unwrap_or(0)
}

/// Library-style heuristic: best expected damage, bail out of bad matchups.
pub struct PokeEnvHeuristic {
    rng: StdRng,
}

impl PokeEnvHeuristic {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl OpponentController for PokeEnvHeuristic {
    fn name(&self) -> &str {
        "PokeEnvHeuristic"
    }

    fn act(&mut self, state: &UniversalState) -> usize {
        let threatened = state.player_active.hp_pct < 0.25
            && state.opponent_active.base_spe > state.player_active.base_spe;
        if threatened
            && let Some(switch) = state
                .available_switches
                .iter()
                .enumerate()
                .filter(|(_, p)| p.hp_pct > 0.5 && p.base_def > state.player_active.base_def)
                .map(|(slot, _)| SWITCH_OFFSET + slot)
                .next()
        {
            return switch;
        }
        best_move(state).unwrap_or_else(|| fallback(state, &mut self.rng))
    }
}

/// Early-generation boss: strongest move most of the time, never switches.
pub struct Gen1BossAI {
    rng: StdRng,
}

impl Gen1BossAI {
    const RANDOM_MOVE_CHANCE: f64 = 0.25;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl OpponentController for Gen1BossAI {
    fn name(&self) -> &str {
        "Gen1BossAI"
    }

    fn act(&mut self, state: &UniversalState) -> usize {
        let moves = legal_moves(state);
        if moves.is_empty() {
            return fallback(state, &mut self.rng);
        }
        if self.rng.random_bool(Self::RANDOM_MOVE_CHANCE) {
            return moves.choose(&mut self.rng).copied().unwrap_or(moves[0]);
        }
        moves
            .into_iter()
            .max_by_key(|&slot| state.player_active.moves[slot].power)
            .unwrap_or(0)
    }
}

/// Low-skill agent: uniformly random legal moves.
pub struct Grunt {
    rng: StdRng,
}

impl Grunt {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl OpponentController for Grunt {
    fn name(&self) -> &str {
        "Grunt"
    }

    fn act(&mut self, state: &UniversalState) -> usize {
        match legal_moves(state).choose(&mut self.rng) {
            Some(&action) => action,
            None => fallback(state, &mut self.rng),
        }
    }
}

/// High-skill agent: best expected damage, retreats when low.
pub struct GymLeader {
    rng: StdRng,
}

impl GymLeader {
    const RETREAT_HP: f32 = 0.4;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl OpponentController for GymLeader {
    fn name(&self) -> &str {
        "GymLeader"
    }

    fn act(&mut self, state: &UniversalState) -> usize {
        if state.player_active.hp_pct <= Self::RETREAT_HP
            && let Some(switch) = healthiest_switch(state)
            && state.available_switches[switch - SWITCH_OFFSET].hp_pct > state.player_active.hp_pct
        {
            return switch;
        }
        best_move(state).unwrap_or_else(|| fallback(state, &mut self.rng))
    }
}

/// Strategy specialist: goes for knockouts and switches to the best matchup.
pub struct EmeraldKaizo {
    rng: StdRng,
}

impl EmeraldKaizo {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn matchup(candidate: &UniversalPokemon, foe: &UniversalPokemon) -> f32 {
        let offence = (0..candidate.moves.len())
            .map(|slot| expected_damage(candidate, slot, foe))
            .fold(0.0, f32::max);
        let defence = (0..foe.moves.len())
            .map(|slot| expected_damage(foe, slot, candidate))
            .fold(0.0, f32::max);
        offence * candidate.hp_pct - defence
    }
}

impl OpponentController for EmeraldKaizo {
    fn name(&self) -> &str {
        "EmeraldKaizo"
    }

    fn act(&mut self, state: &UniversalState) -> usize {
        let foe = &state.opponent_active;
        let foe_hp = foe.hp_pct * f32::from(foe.base_hp);

        // Most accurate move that is expected to knock out
        let finisher = legal_moves(state)
            .into_iter()
            .filter(|&slot| expected_damage(&state.player_active, slot, foe) * 0.5 >= foe_hp)
            .max_by_key(|&slot| state.player_active.moves[slot].accuracy);
        if let Some(slot) = finisher {
            return slot;
        }

        let current = if state.player_active.is_fainted() {
            f32::NEG_INFINITY
        } else {
            Self::matchup(&state.player_active, foe)
        };
        let best_bench = state
            .available_switches
            .iter()
            .enumerate()
            .map(|(slot, p)| (slot, Self::matchup(p, foe)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((slot, score)) = best_bench
            && score > current * 1.5 + 10.0
        {
            return SWITCH_OFFSET + slot;
        }
        best_move(state).unwrap_or_else(|| fallback(state, &mut self.rng))
    }
}
