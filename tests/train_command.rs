//! The `train` subcommand end to end

mod common;

use clap::Parser;
use common::corpus;
use metamon::{
    adapters::MsgPackCheckpointStore,
    cli::commands::train::{TrainArgs, execute},
    ports::CheckpointStore,
};
use tempfile::tempdir;

fn parse_args(ckpt_dir: &str, corpus: &str, extra: &[&str]) -> TrainArgs {
    let mut argv = vec![
        "metamon-train",
        "--run_name",
        "cli",
        "--ckpt_dir",
        ckpt_dir,
        "--parsed_replay_dir",
        corpus,
        "--arch_size",
        "small",
        "--il",
        "--formats",
        "gen1ou",
        "--opponents",
        "PokeEnvHeuristic,Grunt",
        "--train_batches_per_epoch",
        "2",
        "--batch_size_per_gpu",
        "2",
        "--seed",
        "1",
        "--quiet",
    ];
    argv.extend_from_slice(extra);
    TrainArgs::parse_from(argv)
}

#[test]
fn test_train_writes_config_checkpoints_and_summary() {
    let tmp = tempdir().unwrap();
    let corpus = corpus(&tmp.path().join("replays"));
    let ckpt_dir = tmp.path().join("runs");
    let ckpt_arg = ckpt_dir.display().to_string();
    let corpus_arg = corpus.display().to_string();

    execute(parse_args(&ckpt_arg, &corpus_arg, &["--epochs", "2"])).unwrap();

    let run_dir = ckpt_dir.join("cli");
    assert!(run_dir.join("config.json").exists());
    let store = MsgPackCheckpointStore::new(run_dir.join("ckpts"));
    assert_eq!(store.latest().unwrap(), Some(2));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("summary.json")).unwrap())
            .unwrap();
    assert_eq!(summary["epochs_completed"], 2);
    assert_eq!(summary["train_batches"], 4);
    assert_eq!(summary["last_eval"]["episodes"], 2);
}

#[test]
fn test_train_resumes_from_checkpoint() {
    let tmp = tempdir().unwrap();
    let corpus = corpus(&tmp.path().join("replays"));
    let ckpt_dir = tmp.path().join("runs");
    let ckpt_arg = ckpt_dir.display().to_string();
    let corpus_arg = corpus.display().to_string();

    execute(parse_args(&ckpt_arg, &corpus_arg, &["--epochs", "1"])).unwrap();
    let summary_path = tmp.path().join("resumed.json");
    let summary_arg = summary_path.display().to_string();
    execute(parse_args(
        &ckpt_arg,
        &corpus_arg,
        &["--epochs", "2", "--ckpt", "1", "--summary", &summary_arg],
    ))
    .unwrap();

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(summary_path).unwrap()).unwrap();
    assert_eq!(summary["checkpoints"], serde_json::json!([2]));
    assert_eq!(summary["optimizer_steps"], 4);
}

#[test]
fn test_train_rejects_missing_corpus() {
    let tmp = tempdir().unwrap();
    let ckpt_arg = tmp.path().join("runs").display().to_string();
    let missing = tmp.path().join("nowhere").display().to_string();
    let err = execute(parse_args(&ckpt_arg, &missing, &["--epochs", "1"])).unwrap_err();
    assert!(err.to_string().contains("corpus"));
}
