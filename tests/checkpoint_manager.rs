//! Checkpoint persistence and learner restoration

mod common;

use common::{corpus, run_config};
use metamon::{
    Error,
    adapters::{LinearLearner, LinearLearnerConfig, MsgPackCheckpointStore},
    dataset::ParsedReplayDataset,
    ports::{CheckpointStore, Learner, TrainingState, TrajectorySource},
};
use tempfile::tempdir;

fn learner(config: &metamon::RunConfig) -> LinearLearner {
    let dim = config.observation_policy().feature_dim();
    LinearLearner::new(LinearLearnerConfig::from_run(config, dim), config.seed()).unwrap()
}

#[test]
fn test_fresh_store_then_save_and_load() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let config = run_config(dir.path(), &corpus, &[]);
    let store = MsgPackCheckpointStore::new(dir.path().join("ckpts"));
    assert_eq!(store.latest().unwrap(), None);

    let mut trained = learner(&config);
    let mut data = ParsedReplayDataset::new(
        &corpus,
        config.formats(),
        config.observation_policy(),
    )
    .unwrap()
    .with_seed(1);
    for _ in 0..3 {
        let batch = data.sample(2).unwrap();
        trained.accumulate(&batch, 1.0).unwrap();
        trained.apply_update().unwrap();
        trained.soft_update_target(0.004);
    }
    let state = TrainingState {
        learner: trained.state(),
        epoch: 3,
        train_batches: 3,
    };

    store.save(3, &state).unwrap();
    assert_eq!(store.latest().unwrap(), Some(3));
    assert_eq!(store.load(3).unwrap(), state);
}

#[test]
fn test_restored_learner_matches_the_saved_one() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let config = run_config(dir.path(), &corpus, &[]);
    let store = MsgPackCheckpointStore::new(dir.path().join("ckpts"));

    let mut data = ParsedReplayDataset::new(
        &corpus,
        config.formats(),
        config.observation_policy(),
    )
    .unwrap()
    .with_seed(2);
    let mut trained = learner(&config);
    let batch = data.sample(3).unwrap();
    trained.accumulate(&batch, 1.0).unwrap();
    trained.apply_update().unwrap();
    store
        .save(
            1,
            &TrainingState {
                learner: trained.state(),
                epoch: 1,
                train_batches: 1,
            },
        )
        .unwrap();

    let mut restored = learner(&config);
    restored.restore(store.load(1).unwrap().learner).unwrap();
    assert_eq!(restored.state(), trained.state());
    assert_eq!(restored.optimizer_steps(), 1);
}

#[test]
fn test_ordinals_are_append_only() {
    let dir = tempdir().unwrap();
    let corpus = corpus(&dir.path().join("replays"));
    let config = run_config(dir.path(), &corpus, &[]);
    let store = MsgPackCheckpointStore::new(dir.path().join("ckpts"));
    let state = TrainingState {
        learner: learner(&config).state(),
        epoch: 2,
        train_batches: 6,
    };

    store.save(2, &state).unwrap();
    store.save(7, &state).unwrap();
    assert_eq!(store.latest().unwrap(), Some(7));
    assert!(matches!(
        store.save(2, &state),
        Err(Error::CheckpointExists { ordinal: 2 })
    ));
    assert!(matches!(
        store.load(4),
        Err(Error::CheckpointNotFound { ordinal: 4 })
    ));
}
