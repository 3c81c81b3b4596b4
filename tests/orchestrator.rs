//! End-to-end tests for the training orchestrator

mod common;

use common::{corpus, run_config, scripted_factory};
use metamon::{
    Error,
    adapters::{InMemoryCheckpointStore, MemorySink},
    app::App,
    config::RunConfig,
    pipeline::Phase,
    ports::CheckpointStore,
};
use tempfile::tempdir;

fn app(config: RunConfig, store: &InMemoryCheckpointStore) -> App {
    let handle = store.clone();
    App::for_testing(config)
        .with_checkpoints(move || Box::new(handle.clone()))
        .hide_progress()
        .build()
}

#[test]
fn test_fresh_run_trains_evaluates_and_checkpoints() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let store = InMemoryCheckpointStore::new();
    let sink = MemorySink::new();
    let app = app(run_config(dir.path(), &corpus, &[]), &store);

    let mut experiment = app.experiment_with_sinks(vec![Box::new(sink.clone())]).unwrap();
    assert_eq!(experiment.phase(), Phase::Initialized);
    experiment.start().unwrap();
    let summary = experiment.learn().unwrap();

    assert_eq!(experiment.phase(), Phase::Terminated);
    assert_eq!(summary.epochs_completed, 2);
    assert_eq!(summary.train_batches, 6);
    assert_eq!(summary.optimizer_steps, 6);
    assert_eq!(summary.checkpoints, vec![1, 2]);
    assert_eq!(store.ordinals(), vec![1, 2]);

    let eval = summary.last_eval.unwrap();
    assert_eq!(eval.episodes, 1);
    assert!(eval.per_spec.contains_key("gen1ou vs Grunt"));

    let log = sink.snapshot();
    assert_eq!(log.total_batches, Some(6));
    assert!(log.finished);
    assert_eq!(log.series("val/win_rate").len(), 2);
    let steps: Vec<u64> = log.entries.iter().map(|(step, _)| *step).collect();
    assert!(steps.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_gradient_accumulation_scales_batches_not_updates() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let store = InMemoryCheckpointStore::new();
    let app = app(
        run_config(dir.path(), &corpus, &["--grad_accum", "2"]),
        &store,
    );

    let mut experiment = app.experiment_with_sinks(Vec::new()).unwrap();
    experiment.start().unwrap();
    let summary = experiment.learn().unwrap();

    assert_eq!(summary.train_batches, 12);
    assert_eq!(summary.optimizer_steps, 6);
}

#[test]
fn test_resume_continues_after_the_loaded_checkpoint() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let store = InMemoryCheckpointStore::new();

    let first = app(run_config(dir.path(), &corpus, &["--epochs", "1"]), &store);
    let mut experiment = first.experiment_with_sinks(Vec::new()).unwrap();
    experiment.start().unwrap();
    experiment.learn().unwrap();
    assert_eq!(store.latest().unwrap(), Some(1));

    let second = app(
        run_config(dir.path(), &corpus, &["--epochs", "3", "--ckpt", "1"]),
        &store,
    );
    let mut resumed = second.experiment_with_sinks(Vec::new()).unwrap();
    resumed.start().unwrap();
    resumed.load_checkpoint(1).unwrap();
    assert_eq!(resumed.phase(), Phase::Resumed);
    assert_eq!(resumed.epoch(), 1);
    assert_eq!(resumed.train_batches(), 3);

    let summary = resumed.learn().unwrap();
    assert_eq!(summary.epochs_completed, 3);
    assert_eq!(summary.train_batches, 9);
    assert_eq!(summary.optimizer_steps, 9);
    assert_eq!(summary.checkpoints, vec![2, 3]);
    assert_eq!(store.ordinals(), vec![1, 2, 3]);
}

#[test]
fn test_resume_from_missing_checkpoint_fails() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let store = InMemoryCheckpointStore::new();
    let app = app(run_config(dir.path(), &corpus, &[]), &store);

    let mut experiment = app.experiment_with_sinks(Vec::new()).unwrap();
    experiment.start().unwrap();
    let err = experiment.load_checkpoint(5).unwrap_err();
    assert!(matches!(err, Error::CheckpointNotFound { ordinal: 5 }));
}

#[test]
fn test_resume_from_older_checkpoint_is_rejected_before_training() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let store = InMemoryCheckpointStore::new();

    let first = app(run_config(dir.path(), &corpus, &[]), &store);
    let mut experiment = first.experiment_with_sinks(Vec::new()).unwrap();
    experiment.start().unwrap();
    experiment.learn().unwrap();
    assert_eq!(store.ordinals(), vec![1, 2]);

    let second = app(
        run_config(dir.path(), &corpus, &["--epochs", "3", "--ckpt", "1"]),
        &store,
    );
    let mut resumed = second.experiment_with_sinks(Vec::new()).unwrap();
    resumed.start().unwrap();
    let err = resumed.load_checkpoint(1).unwrap_err();
    assert!(matches!(
        err,
        Error::CheckpointSuperseded {
            ordinal: 1,
            latest: 2
        }
    ));
    assert_eq!(resumed.phase(), Phase::Initialized);
    assert_eq!(resumed.train_batches(), 0);
    assert_eq!(store.ordinals(), vec![1, 2]);
}

#[test]
fn test_environment_fault_does_not_disturb_batch_progress() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let store = InMemoryCheckpointStore::new();
    let config = run_config(dir.path(), &corpus, &["--online_coeff", "0.5"]);
    let policy_id = config.observation_policy().id();

    let mut factories: Vec<_> = (0..19)
        .map(|i| scripted_factory(&format!("scripted-{i:02}"), &policy_id, 0))
        .collect();
    factories.push(scripted_factory("scripted-flaky", &policy_id, 1));

    let handle = store.clone();
    let app = App::for_testing(config)
        .with_checkpoints(move || Box::new(handle.clone()))
        .with_environments(factories)
        .hide_progress()
        .build();
    let mut experiment = app.experiment_with_sinks(Vec::new()).unwrap();
    experiment.start().unwrap();
    let summary = experiment.learn().unwrap();

    assert_eq!(summary.train_batches, 6);
    assert_eq!(summary.env_faults, 1);
    assert_eq!(summary.env_skipped, 0);
    let eval = summary.last_eval.unwrap();
    assert_eq!(eval.per_spec.len(), 20);
    assert_eq!(eval.win_rate, 1.0);
}

#[test]
fn test_policy_mismatch_is_rejected_at_wiring() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let store = InMemoryCheckpointStore::new();
    let config = run_config(dir.path(), &corpus, &[]);

    let handle = store.clone();
    let app = App::for_testing(config)
        .with_checkpoints(move || Box::new(handle.clone()))
        .with_environments(vec![scripted_factory("elsewhere", "some-other-policy", 0)])
        .build();
    let err = app.experiment_with_sinks(Vec::new()).err().unwrap();
    assert!(matches!(err, Error::PolicyMismatch { .. }));
}

#[test]
fn test_metrics_log_is_written_when_enabled() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let store = InMemoryCheckpointStore::new();
    let config = run_config(dir.path(), &corpus, &["--log"]);
    let log_path = config.run_dir().join("metrics.jsonl");
    let app = app(config, &store);

    let mut experiment = app.experiment().unwrap();
    experiment.start().unwrap();
    experiment.learn().unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(lines.iter().any(|line| line.get("train/actor_loss").is_some()));
    assert!(lines.iter().any(|line| line.get("val/win_rate").is_some()));
    assert!(lines.iter().all(|line| line["step"].is_u64()));
}
