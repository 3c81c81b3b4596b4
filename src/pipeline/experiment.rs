//! Training orchestrator
//!
//! [`Experiment`] binds a learner, an offline dataset, a set of live
//! environment factories, a checkpoint store and metrics sinks, and drives
//! the epoch loop:
//!
//! ```text
//! INITIALIZED -> RESUMED? -> RUNNING <-> CHECKPOINTING -> TERMINATED
//! ```
//!
//! Each optimizer step accumulates `batches_per_update` micro-batches; each
//! micro-batch is one offline sample plus, when the online coefficient is
//! positive, one sample of recent live episodes.

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    config::{EnvRuntime, ObjectiveWeights, RunConfig, Schedule},
    env::EnvFactory,
    interface::BattleResult,
    ports::{
        CheckpointStore, Learner, LossReport, Metrics, MetricsSink, TrainingState,
        TrajectorySource,
    },
    rollout::{FaultCounts, RolloutPool},
    trajectory::{BatchSource, EpisodeStats, Trajectory, TrajectoryBatch},
};

/// Live episodes kept for online sampling
pub const ONLINE_BUFFER_EPISODES: usize = 256;

/// Optimizer steps between online buffer refreshes
pub const ONLINE_REFRESH_UPDATES: u64 = 50;

/// Optimizer steps between training metric flushes
pub const LOG_INTERVAL_UPDATES: u64 = 100;

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Initialized,
    Resumed,
    Running,
    Checkpointing,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initialized => "initialized",
            Phase::Resumed => "resumed",
            Phase::Running => "running",
            Phase::Checkpointing => "checkpointing",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// The slice of the run configuration the orchestrator needs
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub run_name: String,
    pub schedule: Schedule,
    pub objective: ObjectiveWeights,
    pub runtime: EnvRuntime,
    pub batch_size: usize,
    pub seed: u64,
}

impl ExperimentConfig {
    pub fn from_run(config: &RunConfig) -> Self {
        Self {
            run_name: config.run_name().to_string(),
            schedule: *config.schedule(),
            objective: *config.objective(),
            runtime: *config.runtime(),
            batch_size: config.batch_size(),
            seed: config.seed(),
        }
    }
}

/// Evaluation results for one environment spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecEval {
    pub episodes: usize,
    pub mean_return: f64,
    pub win_rate: f64,
}

/// Evaluation results across all specs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub episodes: usize,
    pub mean_return: f64,
    pub win_rate: f64,
    pub per_spec: BTreeMap<String, SpecEval>,
}

impl EvalSummary {
    pub fn from_episodes(stats: &[EpisodeStats]) -> Self {
        fn fold<'a>(episodes: impl Iterator<Item = &'a EpisodeStats>) -> SpecEval {
            let (mut n, mut total, mut wins) = (0usize, 0.0, 0usize);
            for episode in episodes {
                n += 1;
                total += f64::from(episode.total_return);
                if episode.result == Some(BattleResult::Won) {
                    wins += 1;
                }
            }
            if n == 0 {
                return SpecEval::default();
            }
            SpecEval {
                episodes: n,
                mean_return: total / n as f64,
                win_rate: wins as f64 / n as f64,
            }
        }

        let mut specs: Vec<&str> = stats.iter().map(|s| s.spec.as_str()).collect();
        specs.sort_unstable();
        specs.dedup();
        let per_spec = specs
            .into_iter()
            .map(|spec| {
                let eval = fold(stats.iter().filter(|s| s.spec == spec));
                (spec.to_string(), eval)
            })
            .collect();
        let overall = fold(stats.iter());
        Self {
            episodes: overall.episodes,
            mean_return: overall.mean_return,
            win_rate: overall.win_rate,
            per_spec,
        }
    }

    fn metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert("val/episodes".to_string(), self.episodes as f64);
        metrics.insert("val/return".to_string(), self.mean_return);
        metrics.insert("val/win_rate".to_string(), self.win_rate);
        for (spec, eval) in &self.per_spec {
            metrics.insert(format!("val/{spec}/return"), eval.mean_return);
            metrics.insert(format!("val/{spec}/win_rate"), eval.win_rate);
        }
        metrics
    }
}

/// Outcome of [`Experiment::learn`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub run_name: String,
    pub epochs_completed: u64,
    pub train_batches: u64,
    pub optimizer_steps: u64,
    pub checkpoints: Vec<u64>,
    pub last_eval: Option<EvalSummary>,
    pub env_faults: u64,
    pub env_timeouts: u64,
    pub env_skipped: u64,
}

#[derive(Debug, Default)]
struct LossWindow {
    actor: f64,
    critic: f64,
    filter: f64,
    online_actor: f64,
    grad_norm: f64,
    micro_batches: u64,
    online_batches: u64,
    updates: u64,
}

impl LossWindow {
    fn add(&mut self, report: &LossReport) {
        self.actor += report.actor_loss;
        self.critic += report.critic_loss;
        self.filter += report.filter_rate;
        self.micro_batches += 1;
    }

    fn add_online(&mut self, report: &LossReport) {
        self.online_actor += report.actor_loss;
        self.online_batches += 1;
    }

    fn drain(&mut self, epoch: u64) -> Option<Metrics> {
        if self.micro_batches == 0 {
            return None;
        }
        let n = self.micro_batches as f64;
        let mut metrics = Metrics::new();
        metrics.insert("train/epoch".to_string(), epoch as f64);
        metrics.insert("train/actor_loss".to_string(), self.actor / n);
        metrics.insert("train/critic_loss".to_string(), self.critic / n);
        metrics.insert("train/filter_rate".to_string(), self.filter / n);
        metrics.insert(
            "train/grad_norm".to_string(),
            self.grad_norm / self.updates.max(1) as f64,
        );
        if self.online_batches > 0 {
            metrics.insert(
                "train/online_actor_loss".to_string(),
                self.online_actor / self.online_batches as f64,
            );
        }
        *self = Self::default();
        Some(metrics)
    }
}

/// Builder for [`Experiment`]
pub struct ExperimentBuilder {
    config: ExperimentConfig,
    learner: Option<Box<dyn Learner>>,
    dataset: Option<Box<dyn TrajectorySource>>,
    factories: Vec<EnvFactory>,
    checkpoints: Option<Box<dyn CheckpointStore>>,
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl ExperimentBuilder {
    pub fn learner(mut self, learner: Box<dyn Learner>) -> Self {
        self.learner = Some(learner);
        self
    }

    pub fn dataset(mut self, dataset: Box<dyn TrajectorySource>) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn environments(mut self, factories: Vec<EnvFactory>) -> Self {
        self.factories = factories;
        self
    }

    pub fn checkpoints(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn sink(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Validate the wiring.
    ///
    /// # Errors
    ///
    /// A missing collaborator is a configuration error. A dataset encoded
    /// with a different observation policy than any environment is a
    /// `PolicyMismatch`.
    pub fn build(self) -> Result<Experiment> {
        let learner = self
            .learner
            .ok_or_else(|| Error::config("experiment needs a learner"))?;
        let dataset = self
            .dataset
            .ok_or_else(|| Error::config("experiment needs an offline dataset"))?;
        let checkpoints = self
            .checkpoints
            .ok_or_else(|| Error::config("experiment needs a checkpoint store"))?;
        if self.factories.is_empty() {
            return Err(Error::config("experiment needs at least one environment"));
        }
        let dataset_policy = dataset.policy_id();
        if let Some(factory) = self
            .factories
            .iter()
            .find(|factory| factory.policy_id() != dataset_policy)
        {
            return Err(Error::PolicyMismatch {
                dataset: dataset_policy,
                live: factory.policy_id().to_string(),
            });
        }
        if self.config.batch_size == 0 {
            return Err(Error::config("batch size must be at least 1"));
        }

        Ok(Experiment {
            rng: StdRng::seed_from_u64(self.config.seed),
            config: self.config,
            learner,
            dataset,
            factories: self.factories,
            pool: None,
            checkpoints,
            sinks: self.sinks,
            phase: Phase::Initialized,
            epoch: 0,
            train_batches: 0,
            written: Vec::new(),
            online_buffer: VecDeque::new(),
            last_eval: None,
        })
    }
}

/// The training orchestrator.
pub struct Experiment {
    config: ExperimentConfig,
    learner: Box<dyn Learner>,
    dataset: Box<dyn TrajectorySource>,
    factories: Vec<EnvFactory>,
    pool: Option<RolloutPool>,
    checkpoints: Box<dyn CheckpointStore>,
    sinks: Vec<Box<dyn MetricsSink>>,
    phase: Phase,
    /// Completed epochs
    epoch: u64,
    train_batches: u64,
    written: Vec<u64>,
    online_buffer: VecDeque<Trajectory>,
    last_eval: Option<EvalSummary>,
    rng: StdRng,
}

impl Experiment {
    pub fn builder(config: ExperimentConfig) -> ExperimentBuilder {
        ExperimentBuilder {
            config,
            learner: None,
            dataset: None,
            factories: Vec::new(),
            checkpoints: None,
            sinks: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn train_batches(&self) -> u64 {
        self.train_batches
    }

    pub fn learner(&self) -> &dyn Learner {
        self.learner.as_ref()
    }

    pub fn fault_counts(&self) -> FaultCounts {
        self.pool
            .as_ref()
            .map(RolloutPool::fault_counts)
            .unwrap_or_default()
    }

    /// Build every live environment and seed the learner.
    pub fn start(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        self.learner.set_rng_seed(self.config.seed)?;
        let pool = RolloutPool::spawn(
            self.factories.clone(),
            self.config.runtime,
            self.rng.random(),
        )?;
        tracing::info!(
            run = %self.config.run_name,
            environments = pool.len(),
            corpus = self.dataset.size(),
            online_coeff = self.config.objective.online_coeff(),
            "experiment started"
        );
        self.pool = Some(pool);
        Ok(())
    }

    /// Restore learner state and progress counters from a checkpoint.
    ///
    /// # Errors
    ///
    /// `CheckpointNotFound` if the ordinal was never written;
    /// `CheckpointSuperseded` if a later checkpoint exists; a configuration
    /// error if training has already begun.
    pub fn load_checkpoint(&mut self, ordinal: u64) -> Result<()> {
        if self.phase != Phase::Initialized {
            return Err(Error::config(format!(
                "cannot load a checkpoint in phase {}",
                self.phase
            )));
        }
        if let Some(latest) = self.checkpoints.latest()?
            && latest > ordinal
        {
            return Err(Error::CheckpointSuperseded { ordinal, latest });
        }
        let state = self.checkpoints.load(ordinal)?;
        self.learner.restore(state.learner)?;
        self.epoch = state.epoch;
        self.train_batches = state.train_batches;
        self.phase = Phase::Resumed;
        tracing::info!(
            ordinal,
            epoch = self.epoch,
            train_batches = self.train_batches,
            "resumed from checkpoint"
        );
        Ok(())
    }

    /// Run the remaining epochs.
    pub fn learn(&mut self) -> Result<TrainingSummary> {
        if self.phase == Phase::Terminated {
            return Err(Error::config("experiment already terminated"));
        }
        self.start()?;
        self.phase = Phase::Running;

        let outcome = self.run_epochs();
        let finished = self.finish_sinks();
        if let Some(pool) = self.pool.as_mut() {
            pool.shutdown();
        }
        self.phase = Phase::Terminated;
        outcome?;
        finished?;

        let faults = self.fault_counts();
        Ok(TrainingSummary {
            run_name: self.config.run_name.clone(),
            epochs_completed: self.epoch,
            train_batches: self.train_batches,
            optimizer_steps: self.learner.optimizer_steps(),
            checkpoints: self.written.clone(),
            last_eval: self.last_eval.clone(),
            env_faults: faults.faults,
            env_timeouts: faults.timeouts,
            env_skipped: faults.skipped,
        })
    }

    fn finish_sinks(&mut self) -> Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.finish() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn log(&mut self, metrics: &Metrics) -> Result<()> {
        for sink in &mut self.sinks {
            sink.log(self.train_batches, metrics)?;
        }
        Ok(())
    }

    fn pool(&mut self) -> Result<&mut RolloutPool> {
        self.pool
            .as_mut()
            .ok_or_else(|| Error::config("experiment has not been started"))
    }

    fn run_epochs(&mut self) -> Result<()> {
        let schedule = self.config.schedule;
        let total = schedule.total_batches();
        for sink in &mut self.sinks {
            sink.on_training_start(total)?;
        }

        for epoch in self.epoch + 1..=schedule.epochs {
            let started = self.train_batches;
            self.train_epoch(epoch)?;
            self.epoch = epoch;
            tracing::info!(
                epoch,
                batches = self.train_batches - started,
                optimizer_steps = self.learner.optimizer_steps(),
                "epoch complete"
            );

            if schedule.evaluates_after(epoch) {
                self.evaluate()?;
            }
            if schedule.checkpoints_after(epoch) {
                self.checkpoint(epoch)?;
            }
        }
        Ok(())
    }

    fn train_epoch(&mut self, epoch: u64) -> Result<()> {
        let schedule = self.config.schedule;
        let objective = self.config.objective;
        let accum = schedule.batches_per_update;
        let offline_weight = objective.offline_coeff() / accum as f64;
        let online_weight = objective.online_coeff() / accum as f64;
        let mut window = LossWindow::default();

        for update in 0..schedule.updates_per_epoch() {
            if objective.uses_online_data() && update % ONLINE_REFRESH_UPDATES == 0 {
                self.refresh_online_buffer()?;
            }

            for _ in 0..accum {
                let offline = self.dataset.sample(self.config.batch_size)?;
                let report = self.learner.accumulate(&offline, offline_weight)?;
                window.add(&report);

                if objective.uses_online_data()
                    && let Some(online) = self.sample_online()
                {
                    let report = self.learner.accumulate(&online, online_weight)?;
                    window.add_online(&report);
                }
                self.train_batches += 1;
            }

            window.grad_norm += self.learner.apply_update()?;
            window.updates += 1;
            self.learner.soft_update_target(objective.tau());

            if (update + 1) % LOG_INTERVAL_UPDATES == 0
                && let Some(metrics) = window.drain(epoch)
            {
                self.log(&metrics)?;
            }
        }
        if let Some(metrics) = window.drain(epoch) {
            self.log(&metrics)?;
        }
        Ok(())
    }

    fn refresh_online_buffer(&mut self) -> Result<()> {
        let policy = self.learner.policy();
        let pool = self.pool()?;
        let count = pool.len();
        let episodes = pool.collect(policy, count)?;
        for episode in episodes {
            if self.online_buffer.len() == ONLINE_BUFFER_EPISODES {
                self.online_buffer.pop_front();
            }
            self.online_buffer.push_back(episode.trajectory);
        }
        Ok(())
    }

    fn sample_online(&mut self) -> Option<TrajectoryBatch> {
        if self.online_buffer.is_empty() {
            return None;
        }
        let trajectories = (0..self.config.batch_size)
            .map(|_| {
                let index = self.rng.random_range(0..self.online_buffer.len());
                self.online_buffer[index].clone()
            })
            .collect();
        Some(TrajectoryBatch::new(BatchSource::Online, trajectories))
    }

    fn evaluate(&mut self) -> Result<()> {
        let policy = self.learner.policy();
        let episodes_per_env = self.config.schedule.val_episodes_per_env;
        let pool = self.pool()?;
        let stats = pool.evaluate(policy, episodes_per_env)?;
        let faults = pool.fault_counts();

        let summary = EvalSummary::from_episodes(&stats);
        let mut metrics = summary.metrics();
        metrics.insert("env/faults".to_string(), faults.faults as f64);
        metrics.insert("env/timeouts".to_string(), faults.timeouts as f64);
        metrics.insert("env/skipped".to_string(), faults.skipped as f64);
        tracing::info!(
            episodes = summary.episodes,
            mean_return = summary.mean_return,
            win_rate = summary.win_rate,
            "evaluation"
        );
        self.log(&metrics)?;
        self.last_eval = Some(summary);
        Ok(())
    }

    fn checkpoint(&mut self, ordinal: u64) -> Result<()> {
        self.phase = Phase::Checkpointing;
        let state = TrainingState {
            learner: self.learner.state(),
            epoch: self.epoch,
            train_batches: self.train_batches,
        };
        self.checkpoints.save(ordinal, &state)?;
        self.written.push(ordinal);
        self.phase = Phase::Running;
        tracing::info!(ordinal, "checkpoint saved");
        Ok(())
    }
}

impl Drop for Experiment {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.as_mut() {
            pool.shutdown();
        }
    }
}
