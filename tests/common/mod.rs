//! Shared fixtures for the integration suite.
#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use clap::Parser;
use metamon::{
    Error, Result,
    battle::BattleFormat,
    config::{RunArgs, RunConfig},
    dataset::write_corpus,
    env::EnvFactory,
    interface::{BattleResult, Observation},
    ports::{Environment, StepResult},
};

/// Replays per format in the fixture corpus
pub const CORPUS_SIZE: usize = 6;

/// Small, fast run: one format, one opponent, two epochs of three updates.
///
/// `extra` may set `--epochs` itself; the default of two is added otherwise.
pub fn run_args(ckpt_dir: &Path, corpus: &Path, extra: &[&str]) -> RunArgs {
    let ckpt_dir = ckpt_dir.display().to_string();
    let corpus = corpus.display().to_string();
    let mut argv = vec![
        "metamon",
        "--run_name",
        "fixture",
        "--ckpt_dir",
        ckpt_dir.as_str(),
        "--parsed_replay_dir",
        corpus.as_str(),
        "--arch_size",
        "small",
        "--formats",
        "gen1ou",
        "--opponents",
        "Grunt",
        "--train_batches_per_epoch",
        "3",
        "--batch_size_per_gpu",
        "2",
        "--env_timeout_secs",
        "60",
        "--seed",
        "7",
    ];
    if !extra.contains(&"--epochs") {
        argv.extend_from_slice(&["--epochs", "2"]);
    }
    argv.extend_from_slice(extra);
    RunArgs::parse_from(argv)
}

pub fn run_config(ckpt_dir: &Path, corpus: &Path, extra: &[&str]) -> RunConfig {
    RunConfig::resolve(&run_args(ckpt_dir, corpus, extra)).unwrap()
}

/// Record a fixture corpus for gen1ou under `root`.
pub fn corpus(root: &Path) -> PathBuf {
    let format: BattleFormat = "gen1ou".parse().unwrap();
    write_corpus(root, format, CORPUS_SIZE, 11).unwrap();
    root.to_path_buf()
}

/// Fixed-length episodes; the first `failing_builds` instances crash on
/// their first step.
pub struct ScriptedEnv {
    label: String,
    length: usize,
    t: usize,
    crash: bool,
}

impl Environment for ScriptedEnv {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn reset(&mut self) -> Result<Observation> {
        self.t = 0;
        Ok(Observation {
            numbers: vec![0.0; 4],
            tokens: vec![3, 5],
        })
    }

    fn step(&mut self, _action: usize) -> Result<StepResult> {
        if self.crash {
            return Err(Error::EnvironmentFault {
                spec: self.label.clone(),
                message: "simulator crashed".to_string(),
            });
        }
        self.t += 1;
        let done = self.t >= self.length;
        Ok(StepResult {
            observation: Observation {
                numbers: vec![self.t as f32; 4],
                tokens: vec![3, 5],
            },
            reward: if done { 1.0 } else { 0.0 },
            terminated: done,
            truncated: false,
            result: done.then_some(BattleResult::Won),
        })
    }
}

pub fn scripted_factory(label: &str, policy_id: &str, failing_builds: usize) -> EnvFactory {
    let builds = Arc::new(AtomicUsize::new(0));
    let name = label.to_string();
    EnvFactory::from_fn(label, policy_id, move |_seed| {
        let n = builds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEnv {
            label: name.clone(),
            length: 4,
            t: 0,
            crash: n < failing_builds,
        }) as Box<dyn Environment>)
    })
}
