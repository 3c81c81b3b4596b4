//! Run configuration resolved from command-line arguments
//!
//! [`RunArgs`] is the raw flag surface; [`RunConfig::resolve`] turns it into
//! one immutable, typed snapshot. Identifier strings are parsed here and
//! nowhere else.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use serde::{Deserialize, Serialize};

use super::{
    arch::{ArchPreset, ArchSize},
    objective::{FilterFunc, ObjectiveWeights},
};
use crate::{
    Error, Result,
    battle::{BUILTIN_TEAM_SETS, BattleFormat},
    interface::{ObservationPolicy, ObservationSpaceKind, RewardKind, TokenizerId},
    opponents::{OpponentKind, OpponentRoster},
};

/// Raw training flags.
///
/// Required values are optional here so that their absence is reported by
/// the resolver as a configuration error.
#[derive(Parser, Debug, Clone)]
#[command(about = "Train an agent on offline replays and live battles")]
pub struct RunArgs {
    /// Run identifier; checkpoints go to {ckpt_dir}/{run_name}
    #[arg(long = "run_name")]
    pub run_name: Option<String>,

    /// Observation space
    #[arg(long = "obs_space", default_value = "DefaultObservationSpace")]
    pub obs_space: String,

    /// Reward function
    #[arg(long = "reward_function", default_value = "DefaultShapedReward")]
    pub reward_function: String,

    /// Parsed replay corpus root (default: $METAMON_CACHE_DIR/parsed-replays)
    #[arg(long = "parsed_replay_dir")]
    pub parsed_replay_dir: Option<PathBuf>,

    /// Checkpoint directory
    #[arg(long = "ckpt_dir")]
    pub ckpt_dir: Option<PathBuf>,

    /// Resume from this checkpoint ordinal
    #[arg(long = "ckpt")]
    pub ckpt: Option<u64>,

    /// Trajectories per micro-batch
    #[arg(long = "batch_size_per_gpu", default_value_t = 12)]
    pub batch_size_per_gpu: usize,

    /// Micro-batches per optimizer step
    #[arg(long = "grad_accum", default_value_t = 1)]
    pub grad_accum: u64,

    /// Pure imitation learning
    #[arg(long = "il")]
    pub il: bool,

    /// Architecture tier (small, medium, large)
    #[arg(long = "arch_size")]
    pub arch_size: Option<String>,

    /// Randomly mask observation tokens during training
    #[arg(long = "token_aug")]
    pub token_aug: bool,

    /// Tokenizer vocabulary version
    #[arg(long = "tokenizer", default_value = "allreplays-v3")]
    pub tokenizer: String,

    /// Write metrics to {ckpt_dir}/{run_name}/metrics.jsonl
    #[arg(long = "log")]
    pub log: bool,

    /// Number of epochs
    #[arg(long = "epochs", default_value_t = 40)]
    pub epochs: u64,

    /// Optimizer steps per epoch (scaled by --grad_accum into batches)
    #[arg(long = "train_batches_per_epoch", default_value_t = 25_000)]
    pub train_batches_per_epoch: u64,

    /// Epochs between checkpoints
    #[arg(long = "ckpt_interval", default_value_t = 1)]
    pub ckpt_interval: u64,

    /// Epochs between live evaluations
    #[arg(long = "val_interval", default_value_t = 1)]
    pub val_interval: u64,

    /// Evaluation episodes per environment spec
    #[arg(long = "val_episodes_per_env", default_value_t = 1)]
    pub val_episodes_per_env: usize,

    /// Weight of live rollouts in the objective (not allowed with --il)
    #[arg(long = "online_coeff")]
    pub online_coeff: Option<f64>,

    /// Filter for offline RL (binary, exp); imitation always uses binary
    #[arg(long = "fbc_filter", default_value = "binary")]
    pub fbc_filter: String,

    /// Override the embedded preset for the chosen tier
    #[arg(long = "arch_preset")]
    pub arch_preset: Option<PathBuf>,

    /// Comma-separated battle formats to train on
    #[arg(long = "formats", default_value = "gen1ou,gen2ou,gen3ou,gen4ou")]
    pub formats: String,

    /// Comma-separated opponents (default: the full baseline roster)
    #[arg(long = "opponents")]
    pub opponents: Option<String>,

    /// Team set for live battles
    #[arg(long = "team_set", default_value = "paper_variety")]
    pub team_set: String,

    /// Random seed
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Seconds to wait for a live environment before treating it as hung
    #[arg(long = "env_timeout_secs", default_value_t = 120)]
    pub env_timeout_secs: u64,

    /// Rebuild attempts for a faulting environment
    #[arg(long = "max_env_retries", default_value_t = 3)]
    pub max_env_retries: usize,
}

/// Epoch schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub epochs: u64,
    /// Micro-batches per epoch
    pub train_batches_per_epoch: u64,
    /// Micro-batches per optimizer step
    pub batches_per_update: u64,
    pub ckpt_interval: u64,
    pub val_interval: u64,
    pub val_episodes_per_env: usize,
}

impl Schedule {
    pub fn updates_per_epoch(&self) -> u64 {
        self.train_batches_per_epoch / self.batches_per_update
    }

    pub fn total_batches(&self) -> u64 {
        self.epochs.saturating_mul(self.train_batches_per_epoch)
    }

    /// Whether the checkpoint after `epoch` is written.
    pub fn checkpoints_after(&self, epoch: u64) -> bool {
        epoch % self.ckpt_interval == 0 || epoch == self.epochs
    }

    pub fn evaluates_after(&self, epoch: u64) -> bool {
        epoch % self.val_interval == 0
    }
}

/// Live environment fault handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvRuntime {
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl EnvRuntime {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Immutable configuration snapshot for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    run_name: String,
    ckpt_dir: PathBuf,
    resume: Option<u64>,
    arch_size: ArchSize,
    arch: ArchPreset,
    objective: ObjectiveWeights,
    il: bool,
    batch_size: usize,
    obs_space: ObservationSpaceKind,
    reward: RewardKind,
    tokenizer: TokenizerId,
    token_aug: bool,
    log: bool,
    parsed_replay_dir: Option<PathBuf>,
    formats: Vec<BattleFormat>,
    opponents: Vec<OpponentKind>,
    team_set: String,
    schedule: Schedule,
    runtime: EnvRuntime,
    seed: u64,
}

fn positive(value: u64, flag: &str) -> Result<u64> {
    if value == 0 {
        return Err(Error::config(format!("--{flag} must be at least 1")));
    }
    Ok(value)
}

fn required<'a, T: ?Sized>(value: Option<&'a T>, flag: &str) -> Result<&'a T> {
    value.ok_or_else(|| Error::config(format!("missing required argument --{flag}")))
}

pub(crate) fn parse_list<T>(raw: &str, parse: impl Fn(&str) -> Result<T>) -> Result<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse)
        .collect()
}

impl RunConfig {
    /// Resolve raw flags into a configuration snapshot.
    ///
    /// # Errors
    ///
    /// Fails on a missing `--run_name`, `--ckpt_dir` or `--arch_size`, on
    /// any unknown identifier, and on inconsistent numeric settings.
    pub fn resolve(args: &RunArgs) -> Result<Self> {
        let run_name = required(args.run_name.as_deref(), "run_name")?.trim();
        if run_name.is_empty() {
            return Err(Error::config("--run_name cannot be empty"));
        }
        let ckpt_dir = required(args.ckpt_dir.as_deref(), "ckpt_dir")?;
        let arch_size: ArchSize = required(args.arch_size.as_deref(), "arch_size")?.parse()?;

        let arch = match &args.arch_preset {
            Some(path) => ArchPreset::load(path)?,
            None => ArchPreset::for_size(arch_size)?,
        };

        let filter: FilterFunc = args.fbc_filter.parse()?;
        let mut objective = ObjectiveWeights::for_mode(args.il, filter);
        if let Some(coeff) = args.online_coeff {
            objective = objective.with_online_coeff(coeff)?;
        }

        if args.batch_size_per_gpu == 0 {
            return Err(Error::config("--batch_size_per_gpu must be at least 1"));
        }
        let grad_accum = positive(args.grad_accum, "grad_accum")?;
        let epochs = positive(args.epochs, "epochs")?;
        let train_batches_per_epoch =
            positive(args.train_batches_per_epoch, "train_batches_per_epoch")?
                .checked_mul(grad_accum)
                .ok_or_else(|| {
                    Error::config("--train_batches_per_epoch * --grad_accum overflows")
                })?;
        if epochs.checked_mul(train_batches_per_epoch).is_none() {
            return Err(Error::config(
                "--epochs * --train_batches_per_epoch * --grad_accum overflows",
            ));
        }
        let schedule = Schedule {
            epochs,
            train_batches_per_epoch,
            batches_per_update: grad_accum,
            ckpt_interval: positive(args.ckpt_interval, "ckpt_interval")?,
            val_interval: positive(args.val_interval, "val_interval")?,
            val_episodes_per_env: args.val_episodes_per_env,
        };
        if args.max_env_retries == 0 {
            return Err(Error::config("--max_env_retries must be at least 1"));
        }
        let runtime = EnvRuntime {
            timeout_secs: positive(args.env_timeout_secs, "env_timeout_secs")?,
            max_retries: args.max_env_retries,
        };

        let formats = parse_list(&args.formats, |s| s.parse::<BattleFormat>())?;
        if formats.is_empty() {
            return Err(Error::config("--formats cannot be empty"));
        }
        let opponents = match &args.opponents {
            Some(raw) => OpponentRoster::custom(parse_list(raw, |s| s.parse())?)?,
            None => OpponentRoster::baseline(),
        };
        if !BUILTIN_TEAM_SETS.contains(&args.team_set.as_str()) {
            return Err(Error::config(format!(
                "unknown team set '{}'. Expected one of: {}",
                args.team_set,
                BUILTIN_TEAM_SETS.join(", ")
            )));
        }

        Ok(Self {
            run_name: run_name.to_string(),
            ckpt_dir: ckpt_dir.to_path_buf(),
            resume: args.ckpt,
            arch_size,
            arch,
            objective,
            il: args.il,
            batch_size: args.batch_size_per_gpu,
            obs_space: args.obs_space.parse()?,
            reward: args.reward_function.parse()?,
            tokenizer: args.tokenizer.parse()?,
            token_aug: args.token_aug,
            log: args.log,
            parsed_replay_dir: args.parsed_replay_dir.clone(),
            formats,
            opponents: opponents.list().to_vec(),
            team_set: args.team_set.clone(),
            schedule,
            runtime,
            seed: args.seed.unwrap_or_else(rand::random),
        })
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn ckpt_dir(&self) -> &Path {
        &self.ckpt_dir
    }

    /// Directory holding everything this run writes
    pub fn run_dir(&self) -> PathBuf {
        self.ckpt_dir.join(&self.run_name)
    }

    pub fn resume(&self) -> Option<u64> {
        self.resume
    }

    pub fn arch_size(&self) -> ArchSize {
        self.arch_size
    }

    pub fn arch(&self) -> &ArchPreset {
        &self.arch
    }

    pub fn objective(&self) -> &ObjectiveWeights {
        &self.objective
    }

    pub fn il(&self) -> bool {
        self.il
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn grad_accum(&self) -> u64 {
        self.schedule.batches_per_update
    }

    pub fn tokenizer(&self) -> TokenizerId {
        self.tokenizer
    }

    pub fn token_aug(&self) -> bool {
        self.token_aug
    }

    pub fn log(&self) -> bool {
        self.log
    }

    pub fn parsed_replay_dir(&self) -> Option<&Path> {
        self.parsed_replay_dir.as_deref()
    }

    pub fn formats(&self) -> &[BattleFormat] {
        &self.formats
    }

    pub fn roster(&self) -> Result<OpponentRoster> {
        OpponentRoster::custom(self.opponents.clone())
    }

    pub fn team_set(&self) -> &str {
        &self.team_set
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn runtime(&self) -> &EnvRuntime {
        &self.runtime
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The observation/reward policy shared by corpus and live play
    pub fn observation_policy(&self) -> ObservationPolicy {
        ObservationPolicy::new(self.obs_space, self.reward, self.tokenizer)
    }

    /// Write the snapshot to `{run_dir}/config.json`.
    pub fn persist(&self) -> Result<PathBuf> {
        let dir = self.run_dir();
        fs::create_dir_all(&dir).map_err(|source| Error::Io {
            operation: format!("create run directory {dir:?}"),
            source,
        })?;
        let path = dir.join("config.json");
        let file = fs::File::create(&path).map_err(|source| Error::Io {
            operation: format!("create {path:?}"),
            source,
        })?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::TRAINING_FORMATS;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["metamon", "--run_name", "unit", "--ckpt_dir", "/tmp/ckpts"];
        argv.extend_from_slice(extra);
        RunArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_missing_arch_size_is_an_error() {
        let err = RunConfig::resolve(&args(&[])).unwrap_err();
        assert!(err.to_string().contains("--arch_size"));
    }

    #[test]
    fn test_missing_run_name_is_an_error() {
        let raw = RunArgs::try_parse_from(["metamon", "--ckpt_dir", "/tmp", "--arch_size", "small"])
            .unwrap();
        assert!(matches!(
            RunConfig::resolve(&raw),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_batches_scale_with_accumulation() {
        let config = RunConfig::resolve(&args(&[
            "--arch_size",
            "small",
            "--grad_accum",
            "4",
            "--train_batches_per_epoch",
            "10",
        ]))
        .unwrap();
        assert_eq!(config.schedule().train_batches_per_epoch, 40);
        assert_eq!(config.schedule().batches_per_update, 4);
        assert_eq!(config.schedule().updates_per_epoch(), 10);
    }

    #[test]
    fn test_defaults_match_reference_setup() {
        let config = RunConfig::resolve(&args(&["--arch_size", "medium"])).unwrap();
        assert_eq!(config.batch_size(), 12);
        assert_eq!(config.tokenizer(), TokenizerId::AllReplaysV3);
        assert_eq!(config.formats(), TRAINING_FORMATS.as_slice());
        assert_eq!(config.roster().unwrap().len(), 5);
        assert_eq!(config.schedule().train_batches_per_epoch, 25_000);
    }

    #[test]
    fn test_online_coeff_is_rejected_with_il() {
        let result =
            RunConfig::resolve(&args(&["--arch_size", "small", "--il", "--online_coeff", "0.5"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_last_epoch_always_checkpoints() {
        let schedule = Schedule {
            epochs: 5,
            train_batches_per_epoch: 1,
            batches_per_update: 1,
            ckpt_interval: 2,
            val_interval: 1,
            val_episodes_per_env: 1,
        };
        let written: Vec<u64> = (1..=5).filter(|&e| schedule.checkpoints_after(e)).collect();
        assert_eq!(written, vec![2, 4, 5]);
    }
}
