//! Rollout worker thread
//!
//! Each worker owns exactly one environment and serves one rollout command
//! at a time.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    Error, Result,
    ports::{Environment, Policy},
    trajectory::{EpisodeStats, Trajectory},
};

/// Episodes longer than this are treated as a hung simulator
pub const MAX_EPISODE_STEPS: usize = 10_000;

/// One finished live episode
#[derive(Debug, Clone)]
pub struct Episode {
    pub trajectory: Trajectory,
    pub stats: EpisodeStats,
}

pub(crate) enum Command {
    Rollout {
        request: u64,
        policy: Arc<dyn Policy>,
        episodes: usize,
        seed: u64,
    },
    Stop,
}

pub(crate) struct Outcome {
    pub slot: usize,
    pub generation: u64,
    pub request: u64,
    pub result: Result<Vec<Episode>>,
}

/// Play one episode with `policy`.
pub fn run_episode(
    env: &mut dyn Environment,
    policy: &dyn Policy,
    rng: &mut StdRng,
) -> Result<Episode> {
    let label = env.label();
    let mut observations = vec![env.reset()?];
    let mut actions = Vec::new();
    let mut rewards = Vec::new();

    let (terminated, result) = loop {
        if actions.len() >= MAX_EPISODE_STEPS {
            return Err(Error::EnvironmentFault {
                spec: label,
                message: format!("episode exceeded {MAX_EPISODE_STEPS} steps"),
            });
        }
        let current = observations.last().ok_or_else(|| Error::EnvironmentFault {
            spec: label.clone(),
            message: "no observation to act on".to_string(),
        })?;
        let action = policy.act(current, rng);
        let step = env.step(action)?;
        actions.push(action);
        rewards.push(step.reward);
        let done = step.done();
        observations.push(step.observation);
        if done {
            break (step.terminated, step.result);
        }
    };

    let trajectory = Trajectory::new(observations, actions, rewards, terminated)?;
    let stats = EpisodeStats {
        spec: label,
        total_return: trajectory.total_return(),
        length: trajectory.len(),
        result,
    };
    Ok(Episode { trajectory, stats })
}

pub(crate) struct WorkerHandle {
    pub commands: Sender<Command>,
    pub thread: thread::JoinHandle<()>,
    /// Disconnects when the thread exits
    pub exited: Receiver<()>,
    pub generation: u64,
}

/// Start a worker thread that owns `env`.
pub(crate) fn spawn(
    slot: usize,
    generation: u64,
    mut env: Box<dyn Environment>,
    results: Sender<Outcome>,
) -> Result<WorkerHandle> {
    let (commands, inbox): (Sender<Command>, Receiver<Command>) = crossbeam_channel::bounded(1);
    let (alive, exited) = crossbeam_channel::bounded::<()>(0);
    let name = format!("env-{slot}-{generation}");
    let thread = thread::Builder::new()
        .name(name)
        .spawn(move || {
            let _alive = alive;
            while let Ok(command) = inbox.recv() {
                match command {
                    Command::Rollout {
                        request,
                        policy,
                        episodes,
                        seed,
                    } => {
                        let mut rng = StdRng::seed_from_u64(seed);
                        let result = (0..episodes)
                            .map(|_| run_episode(env.as_mut(), policy.as_ref(), &mut rng))
                            .collect();
                        let outcome = Outcome {
                            slot,
                            generation,
                            request,
                            result,
                        };
                        if results.send(outcome).is_err() {
                            break;
                        }
                    }
                    Command::Stop => break,
                }
            }
        })
        .map_err(|source| Error::Io {
            operation: format!("spawn rollout worker {slot}"),
            source,
        })?;
    Ok(WorkerHandle {
        commands,
        thread,
        exited,
        generation,
    })
}
