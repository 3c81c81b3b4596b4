//! Envs command - list the live environment roster and smoke-test it

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    battle::{BUILTIN_TEAM_SETS, BattleFormat, TeamSet},
    cli::output::{format_percent, print_kv, print_section},
    config::parse_list,
    env::{EnvFactory, baseline_factories, environment_specs},
    interface::{ACTION_SPACE, BattleResult, Observation, ObservationPolicy},
    opponents::{OpponentKind, OpponentRoster},
    ports::Policy,
    rollout::run_episode,
};

#[derive(Parser, Debug)]
#[command(about = "List live environments and optionally play test episodes")]
pub struct EnvsArgs {
    /// Comma-separated battle formats
    #[arg(long, default_value = "gen1ou,gen2ou,gen3ou,gen4ou")]
    pub formats: String,

    /// Comma-separated opponents (default: the full baseline roster)
    #[arg(long)]
    pub opponents: Option<String>,

    /// Team set for live battles
    #[arg(long, default_value = "paper_variety")]
    pub team_set: String,

    /// Episodes to play per environment with a uniform random policy
    #[arg(long, default_value_t = 0)]
    pub episodes: usize,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

/// Picks uniformly from the full action space; the environment remaps
/// illegal choices.
struct UniformPolicy;

impl Policy for UniformPolicy {
    fn act(&self, _observation: &Observation, rng: &mut StdRng) -> usize {
        rng.random_range(0..ACTION_SPACE)
    }
}

fn factories(args: &EnvsArgs) -> Result<Vec<EnvFactory>> {
    let formats: Vec<BattleFormat> = parse_list(&args.formats, |s| s.parse())?;
    let roster = match &args.opponents {
        Some(raw) => OpponentRoster::custom(parse_list(raw, |s| s.parse::<OpponentKind>())?)?,
        None => OpponentRoster::baseline(),
    };
    if !BUILTIN_TEAM_SETS.contains(&args.team_set.as_str()) {
        anyhow::bail!(
            "unknown team set '{}'. Expected one of: {}",
            args.team_set,
            BUILTIN_TEAM_SETS.join(", ")
        );
    }
    let team_sets = formats
        .iter()
        .map(|format| Ok(Arc::new(TeamSet::builtin(*format, &args.team_set)?)))
        .collect::<crate::Result<Vec<_>>>()?;
    let specs = environment_specs(&formats, &roster);
    Ok(baseline_factories(
        &specs,
        &ObservationPolicy::default(),
        &team_sets,
    )?)
}

pub fn execute(args: EnvsArgs) -> Result<()> {
    let factories = factories(&args)?;
    print_section(&format!("{} environments", factories.len()));

    let mut rng = StdRng::seed_from_u64(args.seed);
    for factory in &factories {
        if args.episodes == 0 {
            println!("  {}", factory.label());
            continue;
        }
        let mut env = factory.build(rng.random())?;
        let mut wins = 0usize;
        let mut steps = 0usize;
        for _ in 0..args.episodes {
            let episode = run_episode(env.as_mut(), &UniformPolicy, &mut rng)?;
            steps += episode.stats.length;
            if episode.stats.result == Some(BattleResult::Won) {
                wins += 1;
            }
        }
        print_kv(
            factory.label(),
            &format!(
                "win rate {}, {:.1} steps/episode",
                format_percent(wins as f64 / args.episodes as f64),
                steps as f64 / args.episodes as f64
            ),
        );
    }
    Ok(())
}
