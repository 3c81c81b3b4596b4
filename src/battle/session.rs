//! Scripted two-sided battle session
//!
//! Resolves one turn at a time: switches first, then moves in speed order.
//! Fainted actives are replaced automatically by the first healthy bench
//! member. A side with no healthy members loses; reaching the turn limit is
//! a draw.

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{dex::CreatureSpec, format::BattleFormat, teams::Team};
use crate::{
    Error, Result,
    interface::{
        BattleResult, SWITCH_OFFSET, UniversalMove, UniversalPokemon, UniversalState,
    },
};

/// Default turn limit before a battle is declared a draw
pub const DEFAULT_MAX_TURNS: u32 = 200;

const LEVEL_FACTOR: f32 = 22.0;

/// Which side of the battle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Player,
    Opponent,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Player => 0,
            Side::Opponent => 1,
        }
    }

    fn other(self) -> Side {
        match self {
            Side::Player => Side::Opponent,
            Side::Opponent => Side::Player,
        }
    }
}

#[derive(Debug, Clone)]
struct Combatant {
    spec: CreatureSpec,
    hp: f32,
}

impl Combatant {
    fn new(spec: CreatureSpec) -> Self {
        let hp = f32::from(spec.hp);
        Self { spec, hp }
    }

    fn alive(&self) -> bool {
        self.hp > 0.0
    }

    fn hp_pct(&self) -> f32 {
        (self.hp / f32::from(self.spec.hp).max(1.0)).clamp(0.0, 1.0)
    }

    fn view(&self) -> UniversalPokemon {
        UniversalPokemon {
            name: self.spec.species.clone(),
            hp_pct: self.hp_pct(),
            base_hp: self.spec.hp,
            base_atk: self.spec.attack,
            base_def: self.spec.defense,
            base_spe: self.spec.speed,
            moves: self
                .spec
                .moves
                .iter()
                .map(|m| UniversalMove {
                    name: m.name.clone(),
                    power: m.power,
                    accuracy: m.accuracy,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct Party {
    members: Vec<Combatant>,
    active: usize,
}

impl Party {
    fn new(team: &Team) -> Self {
        Self {
            members: team.members.iter().cloned().map(Combatant::new).collect(),
            active: 0,
        }
    }

    fn active(&self) -> &Combatant {
        &self.members[self.active]
    }

    /// Healthy non-active members, in team order
    fn bench(&self) -> Vec<usize> {
        self.members
            .iter()
            .enumerate()
            .filter(|(index, member)| *index != self.active && member.alive())
            .map(|(index, _)| index)
            .collect()
    }

    fn remaining(&self) -> u8 {
        self.members.iter().filter(|m| m.alive()).count() as u8
    }

    fn hp_total(&self) -> f32 {
        self.members.iter().map(Combatant::hp_pct).sum()
    }
}

/// One live battle between two teams.
#[derive(Debug, Clone)]
pub struct BattleSession {
    format: BattleFormat,
    parties: [Party; 2],
    turn: u32,
    max_turns: u32,
    result: Option<BattleResult>,
    rng: StdRng,
}

impl BattleSession {
    /// Start a battle. Both teams must be legal in `format`.
    pub fn new(format: BattleFormat, player: &Team, opponent: &Team, seed: u64) -> Result<Self> {
        player.validate_for(format)?;
        opponent.validate_for(format)?;
        Ok(Self {
            format,
            parties: [Party::new(player), Party::new(opponent)],
            turn: 0,
            max_turns: DEFAULT_MAX_TURNS,
            result: None,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn format(&self) -> BattleFormat {
        self.format
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Player-perspective result, once the battle is over
    pub fn result(&self) -> Option<BattleResult> {
        self.result
    }

    pub fn is_over(&self) -> bool {
        self.result.is_some()
    }

    /// The battle as seen by `side`.
    pub fn state(&self, side: Side) -> UniversalState {
        let own = &self.parties[side.index()];
        let foe = &self.parties[side.other().index()];
        let outcome = match side {
            Side::Player => self.result,
            Side::Opponent => self.result.map(BattleResult::flipped),
        };
        UniversalState {
            format: self.format.to_string(),
            turn: self.turn,
            player_active: own.active().view(),
            opponent_active: foe.active().view(),
            available_switches: own.bench().into_iter().map(|i| own.members[i].view()).collect(),
            player_hp_total: own.hp_total(),
            opponent_hp_total: foe.hp_total(),
            player_remaining: own.remaining(),
            opponent_remaining: foe.remaining(),
            outcome,
        }
    }

    /// Resolve one turn. Both actions must be legal for their side.
    pub fn step(&mut self, player_action: usize, opponent_action: usize) -> Result<()> {
        if self.is_over() {
            return Err(Error::config("battle is already over"));
        }
        let actions = [player_action, opponent_action];
        for side in [Side::Player, Side::Opponent] {
            let legal = self.state(side).legal_actions();
            if !legal.contains(&actions[side.index()]) {
                return Err(Error::IllegalAction {
                    action: actions[side.index()],
                    valid: legal,
                });
            }
        }

        for side in [Side::Player, Side::Opponent] {
            let action = actions[side.index()];
            if action >= SWITCH_OFFSET {
                let party = &mut self.parties[side.index()];
                let bench = party.bench();
                party.active = bench[action - SWITCH_OFFSET];
            }
        }

        let player_speed = self.parties[0].active().spec.speed;
        let opponent_speed = self.parties[1].active().spec.speed;
        let player_first = match player_speed.cmp(&opponent_speed) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.rng.random_bool(0.5),
        };
        let order = if player_first {
            [Side::Player, Side::Opponent]
        } else {
            [Side::Opponent, Side::Player]
        };
        for side in order {
            let action = actions[side.index()];
            if action < SWITCH_OFFSET && self.parties[side.index()].active().alive() {
                self.attack(side, action);
            }
        }

        for party in &mut self.parties {
            if !party.active().alive()
                && let Some(&replacement) = party.bench().first()
            {
                party.active = replacement;
            }
        }

        self.turn += 1;
        self.result = match (self.parties[0].remaining(), self.parties[1].remaining()) {
            (0, 0) => Some(BattleResult::Draw),
            (0, _) => Some(BattleResult::Lost),
            (_, 0) => Some(BattleResult::Won),
            _ if self.turn >= self.max_turns => Some(BattleResult::Draw),
            _ => None,
        };
        Ok(())
    }

    fn attack(&mut self, attacker: Side, slot: usize) {
        let (power, accuracy, attack) = {
            let active = self.parties[attacker.index()].active();
            let m = &active.spec.moves[slot];
            (f32::from(m.power), m.accuracy, f32::from(active.spec.attack))
        };
        if self.rng.random_range(0..100u8) >= accuracy {
            return;
        }
        let defender = &mut self.parties[attacker.other().index()];
        let defense = f32::from(defender.active().spec.defense).max(1.0);
        let roll: f32 = self.rng.random_range(0.85..=1.0);
        let damage = (LEVEL_FACTOR * power * attack / defense / 50.0 + 2.0) * roll;
        let target = &mut defender.members[defender.active];
        target.hp = (target.hp - damage).max(0.0);
    }
}
