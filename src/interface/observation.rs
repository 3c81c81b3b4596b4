//! Observation spaces: raw battle state to model inputs

use serde::{Deserialize, Serialize};

use super::{
    state::{UniversalPokemon, UniversalState},
    tokenizer::Tokenizer,
};

/// Encoded model input for one timestep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub numbers: Vec<f32>,
    pub tokens: Vec<u32>,
}

/// Text-and-numbers description of a state before tokenization
#[derive(Debug, Clone, PartialEq)]
pub struct TextObservation {
    pub numbers: Vec<f32>,
    pub words: Vec<String>,
}

/// A deterministic encoding of battle states into text and numbers.
pub trait TextObservationSpace: Send + Sync {
    fn name(&self) -> &'static str;

    /// Length of the numerical feature vector
    fn feature_dim(&self) -> usize;

    fn describe(&self, state: &UniversalState) -> TextObservation;
}

/// Full encoding pipeline from raw state to tokenized observation.
pub trait ObservationSpace: Send + Sync {
    /// Identity used to check that two policies encode identically
    fn id(&self) -> String;

    fn feature_dim(&self) -> usize;

    fn encode(&self, state: &UniversalState) -> Observation;
}

const STAT_SCALE: f32 = 200.0;
const POWER_SCALE: f32 = 150.0;
const PARTY: f32 = 6.0;
const MOVE_SLOTS: usize = 4;
const BENCH_SLOTS: usize = 5;

fn best_power(pokemon: &UniversalPokemon) -> f32 {
    pokemon
        .moves
        .iter()
        .map(|m| f32::from(m.power) * f32::from(m.accuracy) / 100.0)
        .fold(0.0, f32::max)
}

fn push_stats(numbers: &mut Vec<f32>, pokemon: &UniversalPokemon) {
    numbers.push(pokemon.hp_pct);
    numbers.push(f32::from(pokemon.base_atk) / STAT_SCALE);
    numbers.push(f32::from(pokemon.base_def) / STAT_SCALE);
    numbers.push(f32::from(pokemon.base_spe) / STAT_SCALE);
}

/// Active creatures, party summaries and move slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultObservationSpace;

impl DefaultObservationSpace {
    const FEATURES: usize = 4 + MOVE_SLOTS * 2 + 5 + 5 + 1;

    fn base_numbers(state: &UniversalState) -> Vec<f32> {
        let mut numbers = Vec::with_capacity(Self::FEATURES);

        push_stats(&mut numbers, &state.player_active);
        for slot in 0..MOVE_SLOTS {
            match state.player_active.moves.get(slot) {
                Some(m) => {
                    numbers.push(f32::from(m.power) / POWER_SCALE);
                    numbers.push(f32::from(m.accuracy) / 100.0);
                }
                None => numbers.extend([0.0, 0.0]),
            }
        }

        push_stats(&mut numbers, &state.opponent_active);
        numbers.push(best_power(&state.opponent_active) / POWER_SCALE);

        numbers.push(state.player_hp_total / PARTY);
        numbers.push(state.opponent_hp_total / PARTY);
        numbers.push(f32::from(state.player_remaining) / PARTY);
        numbers.push(f32::from(state.opponent_remaining) / PARTY);
        numbers.push((state.turn as f32 / 100.0).min(1.0));

        numbers.push(state.available_switches.len() as f32 / BENCH_SLOTS as f32);
        numbers
    }

    fn words(state: &UniversalState) -> Vec<String> {
        let mut words = vec![
            "<player>".to_string(),
            state.format.clone(),
            state.player_active.name.clone(),
        ];
        words.extend(state.player_active.moves.iter().map(|m| m.name.clone()));
        words.push("<opponent>".to_string());
        words.push(state.opponent_active.name.clone());
        words.push("<switches>".to_string());
        words.extend(state.available_switches.iter().map(|p| p.name.clone()));
        words
    }
}

impl TextObservationSpace for DefaultObservationSpace {
    fn name(&self) -> &'static str {
        "DefaultObservationSpace"
    }

    fn feature_dim(&self) -> usize {
        Self::FEATURES
    }

    fn describe(&self, state: &UniversalState) -> TextObservation {
        TextObservation {
            numbers: Self::base_numbers(state),
            words: Self::words(state),
        }
    }
}

/// Default space plus per-slot bench HP and threat.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandedObservationSpace;

impl TextObservationSpace for ExpandedObservationSpace {
    fn name(&self) -> &'static str {
        "ExpandedObservationSpace"
    }

    fn feature_dim(&self) -> usize {
        DefaultObservationSpace::FEATURES + BENCH_SLOTS * 2
    }

    fn describe(&self, state: &UniversalState) -> TextObservation {
        let mut numbers = DefaultObservationSpace::base_numbers(state);
        for slot in 0..BENCH_SLOTS {
            match state.available_switches.get(slot) {
                Some(p) => {
                    numbers.push(p.hp_pct);
                    numbers.push(best_power(p) / POWER_SCALE);
                }
                None => numbers.extend([0.0, 0.0]),
            }
        }
        TextObservation {
            numbers,
            words: DefaultObservationSpace::words(state),
        }
    }
}

/// Wraps a text space and converts its words to token ids.
pub struct TokenizedObservationSpace {
    base: Box<dyn TextObservationSpace>,
    tokenizer: Tokenizer,
}

impl TokenizedObservationSpace {
    pub fn new(base: Box<dyn TextObservationSpace>, tokenizer: Tokenizer) -> Self {
        Self { base, tokenizer }
    }
}

impl ObservationSpace for TokenizedObservationSpace {
    fn id(&self) -> String {
        format!("{}[{}]", self.base.name(), self.tokenizer.id())
    }

    fn feature_dim(&self) -> usize {
        self.base.feature_dim()
    }

    fn encode(&self, state: &UniversalState) -> Observation {
        let text = self.base.describe(state);
        Observation {
            numbers: text.numbers,
            tokens: self.tokenizer.tokenize(&text.words),
        }
    }
}
