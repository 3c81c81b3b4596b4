//! Dependency injection container for training runs.
//!
//! The container owns a resolved [`RunConfig`] and wires the production
//! adapters for it. Tests swap individual collaborators through
//! [`AppBuilder`].

use std::{path::PathBuf, sync::Arc};

use crate::{
    Result,
    adapters::{
        JsonlMetricsSink, LinearLearner, LinearLearnerConfig, MsgPackCheckpointStore, ProgressSink,
    },
    battle::TeamSet,
    config::RunConfig,
    dataset::{self, ParsedReplayDataset},
    env::{EnvFactory, baseline_factories, environment_specs},
    pipeline::{Experiment, ExperimentConfig},
    ports::{CheckpointStore, Learner, MetricsSink, TrajectorySource},
};

/// File name of the metrics log inside the run directory
pub const METRICS_FILE: &str = "metrics.jsonl";

/// Directory holding checkpoints inside the run directory
pub const CHECKPOINT_DIR: &str = "ckpts";

type StoreFactory = Box<dyn Fn() -> Box<dyn CheckpointStore> + Send + Sync>;

/// Application with dependency injection.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use metamon::app::App;
/// use metamon::config::{RunArgs, RunConfig};
///
/// let args = RunArgs::parse_from([
///     "metamon", "--run_name", "demo", "--ckpt_dir", "/tmp/runs", "--arch_size", "small",
/// ]);
/// let app = App::new(RunConfig::resolve(&args)?);
/// let mut experiment = app.experiment()?;
/// experiment.start()?;
/// let summary = experiment.learn()?;
/// # Ok::<(), metamon::Error>(())
/// ```
pub struct App {
    config: RunConfig,
    checkpoints: Option<StoreFactory>,
    dataset_root: Option<PathBuf>,
    environments: Option<Vec<EnvFactory>>,
    show_progress: bool,
}

impl App {
    /// Production wiring for `config`.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            checkpoints: None,
            dataset_root: None,
            environments: None,
            show_progress: true,
        }
    }

    /// Builder for overriding individual collaborators.
    pub fn for_testing(config: RunConfig) -> AppBuilder {
        AppBuilder {
            app: Self::new(config),
        }
    }

    /// Suppress the progress bar sink.
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Where checkpoints are written: `{run_dir}/ckpts`
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.config.run_dir().join(CHECKPOINT_DIR)
    }

    pub fn checkpoint_store(&self) -> Box<dyn CheckpointStore> {
        match &self.checkpoints {
            Some(factory) => factory(),
            None => Box::new(MsgPackCheckpointStore::new(self.checkpoint_dir())),
        }
    }

    /// Corpus root: the explicit directory, else the cache mirror.
    pub fn dataset_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.dataset_root {
            return Ok(root.clone());
        }
        match self.config.parsed_replay_dir() {
            Some(root) => Ok(root.to_path_buf()),
            None => dataset::default_root(),
        }
    }

    pub fn dataset(&self) -> Result<ParsedReplayDataset> {
        let root = self.dataset_root()?;
        let dataset =
            ParsedReplayDataset::new(&root, self.config.formats(), self.config.observation_policy())?;
        tracing::info!(root = %root.display(), replays = dataset.size(), "offline corpus indexed");
        Ok(dataset.with_seed(self.config.seed()))
    }

    /// One team set per training format.
    pub fn team_sets(&self) -> Result<Vec<Arc<TeamSet>>> {
        self.config
            .formats()
            .iter()
            .map(|format| Ok(Arc::new(TeamSet::builtin(*format, self.config.team_set())?)))
            .collect()
    }

    /// A factory for every (format, opponent) pair.
    pub fn environments(&self) -> Result<Vec<EnvFactory>> {
        if let Some(factories) = &self.environments {
            return Ok(factories.clone());
        }
        let specs = environment_specs(self.config.formats(), &self.config.roster()?);
        baseline_factories(&specs, &self.config.observation_policy(), &self.team_sets()?)
    }

    pub fn learner(&self) -> Result<Box<dyn Learner>> {
        let feature_dim = self.config.observation_policy().feature_dim();
        let config = LinearLearnerConfig::from_run(&self.config, feature_dim);
        Ok(Box::new(LinearLearner::new(config, self.config.seed())?))
    }

    /// Progress bar always; the JSONL log when logging is enabled.
    pub fn sinks(&self) -> Result<Vec<Box<dyn MetricsSink>>> {
        let progress = if self.show_progress {
            ProgressSink::new()
        } else {
            ProgressSink::hidden()
        };
        let mut sinks: Vec<Box<dyn MetricsSink>> = vec![Box::new(progress)];
        if self.config.log() {
            let path = self.config.run_dir().join(METRICS_FILE);
            sinks.push(Box::new(JsonlMetricsSink::new(path)?));
        }
        Ok(sinks)
    }

    /// Fully wired orchestrator, not yet started.
    pub fn experiment(&self) -> Result<Experiment> {
        self.experiment_with_sinks(self.sinks()?)
    }

    /// Orchestrator that reports to `sinks` instead of the default ones.
    pub fn experiment_with_sinks(&self, sinks: Vec<Box<dyn MetricsSink>>) -> Result<Experiment> {
        let mut builder = Experiment::builder(ExperimentConfig::from_run(&self.config))
            .learner(self.learner()?)
            .dataset(Box::new(self.dataset()?))
            .environments(self.environments()?)
            .checkpoints(self.checkpoint_store());
        for sink in sinks {
            builder = builder.sink(sink);
        }
        builder.build()
    }
}

/// Builder for constructing an app with custom collaborators.
pub struct AppBuilder {
    app: App,
}

impl AppBuilder {
    /// Use `make` to produce the checkpoint store.
    pub fn with_checkpoints<F>(mut self, make: F) -> Self
    where
        F: Fn() -> Box<dyn CheckpointStore> + Send + Sync + 'static,
    {
        self.app.checkpoints = Some(Box::new(make));
        self
    }

    pub fn with_dataset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.app.dataset_root = Some(root.into());
        self
    }

    pub fn with_environments(mut self, factories: Vec<EnvFactory>) -> Self {
        self.app.environments = Some(factories);
        self
    }

    pub fn hide_progress(mut self) -> Self {
        self.app = self.app.without_progress();
        self
    }

    pub fn build(self) -> App {
        self.app
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::{adapters::InMemoryCheckpointStore, config::RunArgs};

    fn config(dir: &std::path::Path) -> RunConfig {
        let ckpt_dir = dir.display().to_string();
        let args = RunArgs::parse_from([
            "metamon",
            "--run_name",
            "wiring",
            "--ckpt_dir",
            ckpt_dir.as_str(),
            "--arch_size",
            "small",
            "--seed",
            "3",
        ]);
        RunConfig::resolve(&args).unwrap()
    }

    #[test]
    fn test_default_wiring_covers_every_spec() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(config(dir.path()));
        let factories = app.environments().unwrap();
        assert_eq!(factories.len(), 20);
        assert_eq!(factories[0].label(), "gen1ou vs PokeEnvHeuristic");
        assert_eq!(app.team_sets().unwrap().len(), 4);
        assert_eq!(app.checkpoint_dir(), dir.path().join("wiring").join("ckpts"));
    }

    #[test]
    fn test_missing_corpus_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::for_testing(config(dir.path()))
            .with_dataset_root(dir.path().join("absent"))
            .build();
        assert!(matches!(app.dataset(), Err(crate::Error::DataCorpus { .. })));
    }

    #[test]
    fn test_checkpoint_override_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let shared = InMemoryCheckpointStore::new();
        let handle = shared.clone();
        let app = App::for_testing(config(dir.path()))
            .with_checkpoints(move || Box::new(handle.clone()))
            .build();
        assert_eq!(app.checkpoint_store().latest().unwrap(), None);
        assert_eq!(shared.count(), 0);
    }
}
