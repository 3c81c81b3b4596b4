//! Environment factory: live battles against baseline opponents
//!
//! [`make_baseline_env`] builds one [`BaselineEnv`]: a fresh battle session
//! per episode against a freshly instantiated opponent controller, encoded
//! with the shared [`ObservationPolicy`]. [`EnvFactory`] captures the
//! arguments so environments can be rebuilt after a fault.

use std::{fmt, sync::Arc};

use rand::{Rng, SeedableRng, prelude::IndexedRandom, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    battle::{BattleFormat, BattleSession, DEFAULT_MAX_TURNS, Side, TeamSet},
    interface::{ACTION_SPACE, BattleResult, Observation, ObservationPolicy, UniversalState},
    opponents::{OpponentKind, OpponentRoster},
    ports::{Environment, OpponentController, StepResult},
};

/// One (battle format, opponent) combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub format: BattleFormat,
    pub opponent: OpponentKind,
}

impl fmt::Display for EnvironmentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.format, self.opponent)
    }
}

/// Cartesian product of formats and roster entries, format-major.
pub fn environment_specs(formats: &[BattleFormat], roster: &OpponentRoster) -> Vec<EnvironmentSpec> {
    formats
        .iter()
        .flat_map(|&format| {
            roster
                .list()
                .iter()
                .map(move |&opponent| EnvironmentSpec { format, opponent })
        })
        .collect()
}

/// A battle against one scripted baseline opponent.
pub struct BaselineEnv {
    spec: EnvironmentSpec,
    policy: ObservationPolicy,
    team_set: Arc<TeamSet>,
    opponent: Box<dyn OpponentController>,
    session: Option<BattleSession>,
    previous: Option<UniversalState>,
    max_turns: u32,
    illegal_actions: u64,
    rng: StdRng,
}

impl BaselineEnv {
    pub fn illegal_actions(&self) -> u64 {
        self.illegal_actions
    }

    pub fn spec(&self) -> EnvironmentSpec {
        self.spec
    }
}

/// Build an environment for `format` against `opponent`.
///
/// # Errors
///
/// Returns `TeamFormatMismatch` if `team_set` was built for another format,
/// before any battle is started.
pub fn make_baseline_env(
    format: BattleFormat,
    policy: ObservationPolicy,
    team_set: Arc<TeamSet>,
    opponent: OpponentKind,
    seed: u64,
) -> Result<BaselineEnv> {
    if team_set.format() != format {
        return Err(Error::TeamFormatMismatch {
            team: format!("{} (team set)", team_set.name()),
            team_gen: team_set.format().generation(),
            format: format.to_string(),
        });
    }
    for team in team_set.teams() {
        team.validate_for(format)?;
    }
    Ok(BaselineEnv {
        spec: EnvironmentSpec { format, opponent },
        policy,
        team_set,
        opponent: opponent.instantiate(seed ^ 0x9e37_79b9_7f4a_7c15),
        session: None,
        previous: None,
        max_turns: DEFAULT_MAX_TURNS,
        illegal_actions: 0,
        rng: StdRng::seed_from_u64(seed),
    })
}

impl Environment for BaselineEnv {
    fn label(&self) -> String {
        self.spec.to_string()
    }

    fn reset(&mut self) -> Result<Observation> {
        let player_team = self.team_set.sample(&mut self.rng).clone();
        let opponent_team = self.team_set.sample(&mut self.rng).clone();
        let seed = self.rng.random();
        let session = BattleSession::new(self.spec.format, &player_team, &opponent_team, seed)?
            .with_max_turns(self.max_turns);
        let state = session.state(Side::Player);
        let observation = self.policy.encode(&state);
        self.session = Some(session);
        self.previous = Some(state);
        Ok(observation)
    }

    fn step(&mut self, action: usize) -> Result<StepResult> {
        let label = self.label();
        let (session, previous) = match (self.session.as_mut(), self.previous.as_ref()) {
            (Some(session), Some(previous)) if !session.is_over() => (session, previous),
            _ => {
                return Err(Error::EnvironmentFault {
                    spec: label,
                    message: "step called without an active episode".to_string(),
                });
            }
        };

        // Actions outside the legal set are replaced by a random legal one
        let legal = previous.legal_actions();
        let action = if action < ACTION_SPACE && legal.contains(&action) {
            action
        } else {
            self.illegal_actions += 1;
            *legal.choose(&mut self.rng).ok_or_else(|| Error::EnvironmentFault {
                spec: label.clone(),
                message: "no legal actions in a live battle".to_string(),
            })?
        };

        let opponent_view = session.state(Side::Opponent);
        let opponent_action = self.opponent.act(&opponent_view);
        session
            .step(action, opponent_action)
            .map_err(|err| match err {
                Error::IllegalAction { action, valid } => Error::EnvironmentFault {
                    spec: label.clone(),
                    message: format!(
                        "opponent {} chose illegal action {action} (valid {valid:?})",
                        self.opponent.name()
                    ),
                },
                other => other,
            })?;

        let next = session.state(Side::Player);
        let reward = self.policy.reward(previous, &next);
        let observation = self.policy.encode(&next);
        let result = session.result();
        let truncated = result == Some(BattleResult::Draw) && session.turn() >= self.max_turns;
        let terminated = result.is_some() && !truncated;
        self.previous = Some(next);

        Ok(StepResult {
            observation,
            reward,
            terminated,
            truncated,
            result,
        })
    }
}

type BuildFn = dyn Fn(u64) -> Result<Box<dyn Environment>> + Send + Sync;

/// A reusable recipe for one environment spec.
///
/// Calling [`EnvFactory::build`] yields an independent environment each
/// time; nothing is shared between instances.
#[derive(Clone)]
pub struct EnvFactory {
    label: String,
    policy_id: String,
    build: Arc<BuildFn>,
}

impl EnvFactory {
    /// Factory for a baseline-opponent environment.
    pub fn baseline(
        spec: EnvironmentSpec,
        policy: ObservationPolicy,
        team_set: Arc<TeamSet>,
    ) -> Self {
        let policy_id = policy.id();
        Self {
            label: spec.to_string(),
            policy_id,
            build: Arc::new(move |seed| {
                let env = make_baseline_env(
                    spec.format,
                    policy.clone(),
                    Arc::clone(&team_set),
                    spec.opponent,
                    seed,
                )?;
                Ok(Box::new(env) as Box<dyn Environment>)
            }),
        }
    }

    /// Factory from an arbitrary constructor (custom simulators, tests).
    pub fn from_fn<F>(label: impl Into<String>, policy_id: impl Into<String>, build: F) -> Self
    where
        F: Fn(u64) -> Result<Box<dyn Environment>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            policy_id: policy_id.into(),
            build: Arc::new(build),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    pub fn build(&self, seed: u64) -> Result<Box<dyn Environment>> {
        (self.build)(seed)
    }
}

impl fmt::Debug for EnvFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvFactory")
            .field("label", &self.label)
            .field("policy_id", &self.policy_id)
            .finish()
    }
}

/// Factories for every spec, each format using its own team set.
pub fn baseline_factories(
    specs: &[EnvironmentSpec],
    policy: &ObservationPolicy,
    team_sets: &[Arc<TeamSet>],
) -> Result<Vec<EnvFactory>> {
    specs
        .iter()
        .map(|spec| {
            let team_set = team_sets
                .iter()
                .find(|set| set.format() == spec.format)
                .ok_or_else(|| Error::config(format!("no team set for {}", spec.format)))?;
            Ok(EnvFactory::baseline(
                *spec,
                policy.clone(),
                Arc::clone(team_set),
            ))
        })
        .collect()
}
