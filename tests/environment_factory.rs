//! Live environment construction across the full training roster

use std::sync::Arc;

use metamon::{
    Error,
    battle::{TRAINING_FORMATS, TeamSet},
    env::{baseline_factories, environment_specs, make_baseline_env},
    interface::{Observation, ObservationPolicy},
    opponents::{OpponentKind, OpponentRoster},
    ports::Policy,
    rollout::run_episode,
};
use rand::{SeedableRng, rngs::StdRng};

struct AlwaysFirst;

impl Policy for AlwaysFirst {
    fn act(&self, _observation: &Observation, _rng: &mut StdRng) -> usize {
        0
    }
}

fn team_sets() -> Vec<Arc<TeamSet>> {
    TRAINING_FORMATS
        .iter()
        .map(|format| Arc::new(TeamSet::builtin(*format, "paper_variety").unwrap()))
        .collect()
}

#[test]
fn test_every_spec_plays_an_episode_to_the_end() {
    let specs = environment_specs(&TRAINING_FORMATS, &OpponentRoster::baseline());
    assert_eq!(specs.len(), 20);
    let factories =
        baseline_factories(&specs, &ObservationPolicy::default(), &team_sets()).unwrap();

    let mut rng = StdRng::seed_from_u64(9);
    for (index, factory) in factories.iter().enumerate() {
        let mut env = factory.build(index as u64).unwrap();
        let episode = run_episode(env.as_mut(), &AlwaysFirst, &mut rng).unwrap();
        assert_eq!(episode.stats.spec, factory.label());
        assert!(episode.stats.result.is_some(), "{} never finished", factory.label());
        assert_eq!(
            episode.trajectory.observations.len(),
            episode.trajectory.actions.len() + 1
        );
    }
}

#[test]
fn test_equal_seeds_give_equal_episodes() {
    let format = TRAINING_FORMATS[2];
    let teams = Arc::new(TeamSet::builtin(format, "paper_variety").unwrap());
    let play = |seed: u64| {
        let mut env = make_baseline_env(
            format,
            ObservationPolicy::default(),
            Arc::clone(&teams),
            OpponentKind::GymLeader,
            seed,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        run_episode(&mut env, &AlwaysFirst, &mut rng).unwrap()
    };

    let (a, b) = (play(4), play(4));
    assert_eq!(a.trajectory, b.trajectory);
}

#[test]
fn test_team_set_for_another_generation_is_rejected() {
    let gen1 = Arc::new(TeamSet::builtin(TRAINING_FORMATS[0], "paper_variety").unwrap());
    let result = make_baseline_env(
        TRAINING_FORMATS[3],
        ObservationPolicy::default(),
        gen1,
        OpponentKind::Grunt,
        0,
    );
    assert!(matches!(result, Err(Error::TeamFormatMismatch { .. })));
}
