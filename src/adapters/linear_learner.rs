//! Linear reference learner
//!
//! A softmax actor and one linear Q head per discount over a fixed feature
//! map (numerical observation features, a bag of hashed tokens and a bias).
//! The actor is trained by filtered behaviour cloning; the critics by
//! one-step TD against Polyak-averaged target heads.

use std::{collections::BTreeMap, sync::Arc};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    Result,
    config::{FilterFunc, RunConfig},
    error::Error,
    interface::{ACTION_SPACE, Observation, tokenizer::PAD_TOKEN},
    ports::{Learner, LearnerState, LossReport, Policy},
    trajectory::{Trajectory, TrajectoryBatch},
};

const KIND: &str = "linear";

/// Probability of masking each token when token augmentation is on
const TOKEN_MASK_RATE: f64 = 0.15;

/// Hyperparameters of [`LinearLearner`]
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLearnerConfig {
    pub feature_dim: usize,
    pub token_buckets: usize,
    pub learning_rate: f64,
    pub grad_clip: f64,
    /// Discount per critic head; the first is the primary head
    pub gammas: Vec<f64>,
    pub reward_multiplier: f64,
    pub filter: FilterFunc,
    /// Accept every demonstrated action regardless of advantage
    pub fake_filter: bool,
    pub token_aug: bool,
    pub max_seq_len: usize,
}

impl LinearLearnerConfig {
    /// Hyperparameters for a resolved run and an observation width.
    pub fn from_run(config: &RunConfig, feature_dim: usize) -> Self {
        let arch = config.arch();
        let objective = config.objective();
        let mut gammas = vec![arch.gamma];
        if objective.use_multigamma() {
            gammas.extend(arch.multigammas.iter().copied());
        }
        Self {
            feature_dim,
            token_buckets: arch.token_buckets,
            learning_rate: arch.learning_rate,
            grad_clip: arch.grad_clip,
            gammas,
            reward_multiplier: objective.reward_multiplier(),
            filter: objective.filter(),
            fake_filter: objective.fake_filter(),
            token_aug: config.token_aug(),
            max_seq_len: arch.max_seq_len,
        }
    }
}

/// Maps an observation onto a dense feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeatureMap {
    feature_dim: usize,
    token_buckets: usize,
}

impl FeatureMap {
    fn width(&self) -> usize {
        self.feature_dim + self.token_buckets + 1
    }

    fn extract(&self, observation: &Observation, mask: Option<&mut StdRng>) -> Vec<f32> {
        let mut features = vec![0.0; self.width()];
        for (slot, value) in features.iter_mut().zip(&observation.numbers) {
            *slot = *value;
        }

        let mut kept: Vec<u32> = observation
            .tokens
            .iter()
            .copied()
            .filter(|&t| t != PAD_TOKEN)
            .collect();
        if let Some(rng) = mask {
            kept.retain(|_| !rng.random_bool(TOKEN_MASK_RATE));
        }
        if !kept.is_empty() {
            let share = 1.0 / kept.len() as f32;
            for token in kept {
                features[self.feature_dim + token as usize % self.token_buckets] += share;
            }
        }

        let bias = self.width() - 1;
        features[bias] = 1.0;
        features
    }
}

/// `weights (ACTION_SPACE x width) * features`
fn scores(weights: &[f32], features: &[f32]) -> [f64; ACTION_SPACE] {
    let width = features.len();
    let mut out = [0.0; ACTION_SPACE];
    for (action, row) in weights.chunks_exact(width).enumerate() {
        out[action] = row
            .iter()
            .zip(features)
            .map(|(w, x)| f64::from(*w) * f64::from(*x))
            .sum();
    }
    out
}

fn softmax(logits: &[f64; ACTION_SPACE]) -> [f64; ACTION_SPACE] {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut probs = logits.map(|l| (l - max).exp());
    let total: f64 = probs.iter().sum();
    probs.iter_mut().for_each(|p| *p /= total);
    probs
}

/// Add `scale * features` to one action row of a gradient buffer
fn add_row(grad: &mut [f64], action: usize, features: &[f32], scale: f64) {
    let width = features.len();
    let row = &mut grad[action * width..(action + 1) * width];
    for (g, x) in row.iter_mut().zip(features) {
        *g += scale * f64::from(*x);
    }
}

/// Immutable acting snapshot of the actor weights
struct LinearPolicy {
    features: FeatureMap,
    actor: Vec<f32>,
}

impl Policy for LinearPolicy {
    fn act(&self, observation: &Observation, rng: &mut StdRng) -> usize {
        let features = self.features.extract(observation, None);
        let probs = softmax(&scores(&self.actor, &features));
        let ticket: f64 = rng.random();
        let mut cumulative = 0.0;
        for (action, p) in probs.iter().enumerate() {
            cumulative += p;
            if ticket <= cumulative {
                return action;
            }
        }
        ACTION_SPACE - 1
    }
}

/// Linear actor-critic learner.
pub struct LinearLearner {
    config: LinearLearnerConfig,
    features: FeatureMap,
    actor: Vec<f32>,
    critics: Vec<Vec<f32>>,
    targets: Vec<Vec<f32>>,
    actor_grad: Vec<f64>,
    critic_grads: Vec<Vec<f64>>,
    pending: usize,
    optimizer_steps: u64,
    rng: StdRng,
}

impl LinearLearner {
    pub fn new(config: LinearLearnerConfig, seed: u64) -> Result<Self> {
        if config.gammas.is_empty() {
            return Err(Error::config("linear learner needs at least one discount"));
        }
        if config.token_buckets == 0 || config.max_seq_len == 0 {
            return Err(Error::config("linear learner sizes must be positive"));
        }
        let features = FeatureMap {
            feature_dim: config.feature_dim,
            token_buckets: config.token_buckets,
        };
        let size = ACTION_SPACE * features.width();
        let heads = config.gammas.len();
        Ok(Self {
            features,
            actor: vec![0.0; size],
            critics: vec![vec![0.0; size]; heads],
            targets: vec![vec![0.0; size]; heads],
            actor_grad: vec![0.0; size],
            critic_grads: vec![vec![0.0; size]; heads],
            pending: 0,
            optimizer_steps: 0,
            rng: StdRng::seed_from_u64(seed),
            config,
        })
    }

    pub fn config(&self) -> &LinearLearnerConfig {
        &self.config
    }

    /// Micro-batches accumulated since the last update
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Transitions of `trajectory` used for training, at most `max_seq_len`
    fn window(&mut self, trajectory: &Trajectory) -> std::ops::Range<usize> {
        let len = trajectory.len();
        if len <= self.config.max_seq_len {
            return 0..len;
        }
        let start = self.rng.random_range(0..=len - self.config.max_seq_len);
        start..start + self.config.max_seq_len
    }

    fn shape_error(&self, what: &str) -> Error {
        Error::SerializationContext {
            operation: "restore linear learner".to_string(),
            message: format!("{what} does not match the configured shape"),
        }
    }
}

impl Learner for LinearLearner {
    fn name(&self) -> &str {
        KIND
    }

    fn accumulate(&mut self, batch: &TrajectoryBatch, weight: f64) -> Result<LossReport> {
        let width = self.features.width();
        let mut actor_grad = vec![0.0; self.actor.len()];
        let mut critic_grads = vec![vec![0.0; self.actor.len()]; self.critics.len()];
        let mut report = LossReport::default();

        for trajectory in &batch.trajectories {
            let window = self.window(trajectory);
            for t in window {
                let mask = if self.config.token_aug {
                    Some(&mut self.rng)
                } else {
                    None
                };
                let x = self.features.extract(&trajectory.observations[t], mask);
                let next = self.features.extract(&trajectory.observations[t + 1], None);
                debug_assert_eq!(x.len(), width);
                let action = trajectory.actions[t];
                if action >= ACTION_SPACE {
                    return Err(Error::IllegalAction {
                        action,
                        valid: (0..ACTION_SPACE).collect(),
                    });
                }
                let reward = f64::from(trajectory.rewards[t]) * self.config.reward_multiplier;
                let done = trajectory.terminal && t + 1 == trajectory.len();

                let probs = softmax(&scores(&self.actor, &x));
                let next_probs = softmax(&scores(&self.actor, &next));

                // Critic heads: one-step TD against the target copies
                let mut primary_q = [0.0; ACTION_SPACE];
                for (head, gamma) in self.config.gammas.iter().enumerate() {
                    let q = scores(&self.critics[head], &x);
                    if head == 0 {
                        primary_q = q;
                    }
                    let bootstrap = if done {
                        0.0
                    } else {
                        let target_q = scores(&self.targets[head], &next);
                        next_probs.iter().zip(&target_q).map(|(p, q)| p * q).sum()
                    };
                    let td = q[action] - (reward + gamma * bootstrap);
                    report.critic_loss += 0.5 * td * td;
                    add_row(&mut critic_grads[head], action, &x, td);
                }

                // Actor: filtered behaviour cloning on the primary head
                let baseline: f64 = probs.iter().zip(&primary_q).map(|(p, q)| p * q).sum();
                let advantage = primary_q[action] - baseline;
                let accept = if self.config.fake_filter {
                    1.0
                } else {
                    self.config.filter.weight(advantage)
                };
                report.actor_loss -= accept * probs[action].max(1e-12).ln();
                report.filter_rate += accept.min(1.0);
                if accept > 0.0 {
                    for (a, p) in probs.iter().enumerate() {
                        let indicator = if a == action { 1.0 } else { 0.0 };
                        add_row(&mut actor_grad, a, &x, accept * (p - indicator));
                    }
                }
                report.transitions += 1;
            }
        }

        if report.transitions == 0 {
            return Ok(report);
        }
        let n = report.transitions as f64;
        report.actor_loss /= n;
        report.critic_loss /= n * self.critics.len() as f64;
        report.filter_rate /= n;

        if weight != 0.0 {
            let scale = weight / n;
            for (acc, g) in self.actor_grad.iter_mut().zip(&actor_grad) {
                *acc += scale * g;
            }
            for (acc_head, head) in self.critic_grads.iter_mut().zip(&critic_grads) {
                for (acc, g) in acc_head.iter_mut().zip(head) {
                    *acc += scale * g;
                }
            }
            self.pending += 1;
        }
        Ok(report)
    }

    fn apply_update(&mut self) -> Result<f64> {
        let norm = self
            .actor_grad
            .iter()
            .chain(self.critic_grads.iter().flatten())
            .map(|g| g * g)
            .sum::<f64>()
            .sqrt();
        let clip = if norm > self.config.grad_clip {
            self.config.grad_clip / norm
        } else {
            1.0
        };
        let step = self.config.learning_rate * clip;

        for (w, g) in self.actor.iter_mut().zip(self.actor_grad.iter_mut()) {
            *w -= (step * *g) as f32;
            *g = 0.0;
        }
        for (weights, grads) in self.critics.iter_mut().zip(self.critic_grads.iter_mut()) {
            for (w, g) in weights.iter_mut().zip(grads.iter_mut()) {
                *w -= (step * *g) as f32;
                *g = 0.0;
            }
        }
        self.pending = 0;
        self.optimizer_steps += 1;
        Ok(norm)
    }

    fn soft_update_target(&mut self, tau: f64) {
        let tau = tau as f32;
        for (target, online) in self.targets.iter_mut().zip(&self.critics) {
            for (t, o) in target.iter_mut().zip(online) {
                *t = tau * *o + (1.0 - tau) * *t;
            }
        }
    }

    fn policy(&self) -> Arc<dyn Policy> {
        Arc::new(LinearPolicy {
            features: self.features,
            actor: self.actor.clone(),
        })
    }

    fn state(&self) -> LearnerState {
        let mut tensors = BTreeMap::new();
        tensors.insert("actor".to_string(), self.actor.clone());
        for (head, (critic, target)) in self.critics.iter().zip(&self.targets).enumerate() {
            tensors.insert(format!("critic.{head}"), critic.clone());
            tensors.insert(format!("critic_target.{head}"), target.clone());
        }
        LearnerState {
            kind: KIND.to_string(),
            optimizer_steps: self.optimizer_steps,
            tensors,
        }
    }

    fn restore(&mut self, mut state: LearnerState) -> Result<()> {
        if state.kind != KIND {
            return Err(Error::SerializationContext {
                operation: "restore linear learner".to_string(),
                message: format!("checkpoint was written by a '{}' learner", state.kind),
            });
        }
        let size = self.actor.len();
        let mut take = |name: String| -> Result<Vec<f32>> {
            match state.tensors.remove(&name) {
                Some(tensor) if tensor.len() == size => Ok(tensor),
                _ => Err(self.shape_error(&name)),
            }
        };

        let actor = take("actor".to_string())?;
        let mut critics = Vec::with_capacity(self.critics.len());
        let mut targets = Vec::with_capacity(self.critics.len());
        for head in 0..self.critics.len() {
            critics.push(take(format!("critic.{head}"))?);
            targets.push(take(format!("critic_target.{head}"))?);
        }
        if !state.tensors.is_empty() {
            return Err(self.shape_error("number of critic heads"));
        }

        self.actor = actor;
        self.critics = critics;
        self.targets = targets;
        self.actor_grad.iter_mut().for_each(|g| *g = 0.0);
        self.critic_grads.iter_mut().flatten().for_each(|g| *g = 0.0);
        self.pending = 0;
        self.optimizer_steps = state.optimizer_steps;
        Ok(())
    }

    fn optimizer_steps(&self) -> u64 {
        self.optimizer_steps
    }

    fn set_rng_seed(&mut self, seed: u64) -> Result<()> {
        self.rng = StdRng::seed_from_u64(seed);
        Ok(())
    }
}
