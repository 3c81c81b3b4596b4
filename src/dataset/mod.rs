//! Offline dataset provider over parsed replay files
//!
//! Replays are stored as raw, format-agnostic [`UniversalState`] sequences
//! and encoded with the live [`ObservationPolicy`] each time they are
//! sampled, so the corpus never has to be rebuilt when the policy changes.

pub mod record;

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

pub use record::{record_replay, write_corpus};

use crate::{
    Error, Result,
    battle::BattleFormat,
    interface::{ACTION_SPACE, ObservationPolicy, UniversalState},
    ports::TrajectorySource,
    trajectory::{BatchSource, Trajectory, TrajectoryBatch},
};

/// Environment variable pointing at the local mirror cache
pub const CACHE_DIR_VAR: &str = "METAMON_CACHE_DIR";

/// Sub-directory of the cache that holds the parsed replay mirror
pub const PARSED_REPLAY_DIR: &str = "parsed-replays";

/// One recorded battle from the player's point of view.
///
/// `states` holds one entry more than `actions`; the final state is the
/// position after the last action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReplay {
    pub format: BattleFormat,
    pub states: Vec<UniversalState>,
    pub actions: Vec<usize>,
}

impl ParsedReplay {
    pub fn validate(&self) -> Result<()> {
        if self.states.len() != self.actions.len() + 1 {
            return Err(Error::corpus(format!(
                "replay has {} states for {} actions",
                self.states.len(),
                self.actions.len()
            )));
        }
        if let Some(&action) = self.actions.iter().find(|&&a| a >= ACTION_SPACE) {
            return Err(Error::corpus(format!("replay action {action} out of range")));
        }
        Ok(())
    }

    /// Encode with `policy` into a trajectory.
    pub fn encode(&self, policy: &ObservationPolicy) -> Result<Trajectory> {
        self.validate()?;
        let observations = self.states.iter().map(|s| policy.encode(s)).collect();
        let rewards = self
            .states
            .windows(2)
            .map(|pair| policy.reward(&pair[0], &pair[1]))
            .collect();
        let terminal = self.states.last().is_some_and(UniversalState::is_terminal);
        Trajectory::new(observations, self.actions.clone(), rewards, terminal)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).map_err(|source| Error::Io {
            operation: format!("open replay {path:?}"),
            source,
        })?;
        let replay: ParsedReplay = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::corpus(format!("unreadable replay {path:?}: {e}")))?;
        replay.validate()?;
        Ok(replay)
    }
}

/// Corpus root used when none is given on the command line.
pub fn default_root() -> Result<PathBuf> {
    match env::var_os(CACHE_DIR_VAR) {
        Some(dir) => Ok(PathBuf::from(dir).join(PARSED_REPLAY_DIR)),
        None => Err(Error::corpus(format!(
            "no --parsed_replay_dir given and {CACHE_DIR_VAR} is not set"
        ))),
    }
}

#[derive(Debug, Clone)]
enum Entry {
    File(PathBuf),
    Memory(ParsedReplay),
}

/// Sampleable corpus of parsed replays.
///
/// # Examples
///
/// ```no_run
/// use metamon::battle::TRAINING_FORMATS;
/// use metamon::dataset::ParsedReplayDataset;
/// use metamon::interface::ObservationPolicy;
/// use metamon::ports::TrajectorySource;
/// use std::path::Path;
///
/// let mut dataset = ParsedReplayDataset::new(
///     Path::new("/data/parsed-replays"),
///     &TRAINING_FORMATS,
///     ObservationPolicy::default(),
/// )?
/// .with_seed(7);
/// let batch = dataset.sample(12)?;
/// assert_eq!(batch.len(), 12);
/// # Ok::<(), metamon::Error>(())
/// ```
pub struct ParsedReplayDataset {
    root: String,
    entries: Vec<Entry>,
    policy: ObservationPolicy,
    rng: StdRng,
}

impl ParsedReplayDataset {
    /// Index every `{root}/{format}/*.json` file.
    ///
    /// # Errors
    ///
    /// `DataCorpus` if `root` is missing, `EmptyCorpus` if no replay matches
    /// the requested formats.
    pub fn new(root: &Path, formats: &[BattleFormat], policy: ObservationPolicy) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::corpus(format!("corpus root {root:?} does not exist")));
        }
        let mut entries = Vec::new();
        for format in formats {
            let dir = root.join(format.to_string());
            if !dir.is_dir() {
                tracing::warn!(format = %format, dir = ?dir, "no replays for format");
                continue;
            }
            let listing = fs::read_dir(&dir).map_err(|source| Error::Io {
                operation: format!("list replay directory {dir:?}"),
                source,
            })?;
            let mut paths: Vec<PathBuf> = listing
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
                .collect();
            paths.sort();
            tracing::debug!(format = %format, replays = paths.len(), "indexed replays");
            entries.extend(paths.into_iter().map(Entry::File));
        }
        if entries.is_empty() {
            return Err(Error::EmptyCorpus {
                root: root.display().to_string(),
                formats: formats.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(Self {
            root: root.display().to_string(),
            entries,
            policy,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Corpus held entirely in memory.
    pub fn from_replays(replays: Vec<ParsedReplay>, policy: ObservationPolicy) -> Result<Self> {
        if replays.is_empty() {
            return Err(Error::EmptyCorpus {
                root: "<memory>".to_string(),
                formats: Vec::new(),
            });
        }
        for replay in &replays {
            replay.validate()?;
        }
        Ok(Self {
            root: "<memory>".to_string(),
            entries: replays.into_iter().map(Entry::Memory).collect(),
            policy,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Deterministic sampling: equal seeds give equal batch sequences.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn policy(&self) -> &ObservationPolicy {
        &self.policy
    }

    fn read(&self, index: usize) -> Result<Trajectory> {
        match &self.entries[index] {
            Entry::File(path) => ParsedReplay::load(path)?.encode(&self.policy),
            Entry::Memory(replay) => replay.encode(&self.policy),
        }
    }
}

impl TrajectorySource for ParsedReplayDataset {
    fn sample(&mut self, batch_size: usize) -> Result<TrajectoryBatch> {
        let indices: Vec<usize> = (0..batch_size)
            .map(|_| self.rng.random_range(0..self.entries.len()))
            .collect();
        let trajectories = indices
            .into_iter()
            .map(|index| self.read(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(TrajectoryBatch::new(BatchSource::Offline, trajectories))
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn policy_id(&self) -> String {
        self.policy.id()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{
        battle::TeamSet,
        interface::{ObservationSpaceKind, RewardKind, TokenizerId},
        opponents::OpponentKind,
    };

    fn replays(n: u64) -> Vec<ParsedReplay> {
        let format: BattleFormat = "gen1ou".parse().unwrap();
        let teams = TeamSet::builtin(format, "paper_variety").unwrap();
        (0..n)
            .map(|seed| {
                record_replay(format, &teams, OpponentKind::GymLeader, OpponentKind::Grunt, seed)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_missing_root_is_a_corpus_error() {
        let result = ParsedReplayDataset::new(
            Path::new("/nonexistent/metamon/corpus"),
            &["gen1ou".parse().unwrap()],
            ObservationPolicy::default(),
        );
        assert!(matches!(result, Err(Error::DataCorpus { .. })));
    }

    #[test]
    fn test_empty_root_is_an_empty_corpus() {
        let dir = TempDir::new().unwrap();
        let result = ParsedReplayDataset::new(
            dir.path(),
            &["gen1ou".parse().unwrap()],
            ObservationPolicy::default(),
        );
        assert!(matches!(result, Err(Error::EmptyCorpus { .. })));
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let corpus = replays(6);
        let mut a = ParsedReplayDataset::from_replays(corpus.clone(), ObservationPolicy::default())
            .unwrap()
            .with_seed(11);
        let mut b = ParsedReplayDataset::from_replays(corpus, ObservationPolicy::default())
            .unwrap()
            .with_seed(11);
        for _ in 0..3 {
            let left = a.sample(4).unwrap();
            let right = b.sample(4).unwrap();
            assert_eq!(left.trajectories, right.trajectories);
        }
    }

    #[test]
    fn test_encoding_follows_the_policy() {
        let corpus = replays(1);
        let binary = ObservationPolicy::new(
            ObservationSpaceKind::Default,
            RewardKind::Binary,
            TokenizerId::AllReplaysV3,
        );
        let mut dataset = ParsedReplayDataset::from_replays(corpus.clone(), binary.clone())
            .unwrap()
            .with_seed(0);
        let batch = dataset.sample(1).unwrap();
        let trajectory = &batch.trajectories[0];

        assert_eq!(trajectory.len(), corpus[0].actions.len());
        assert_eq!(trajectory.observations[0], binary.encode(&corpus[0].states[0]));
        // Only the final transition carries a binary reward
        let nonzero = trajectory.rewards.iter().filter(|r| **r != 0.0).count();
        assert!(nonzero <= 1);
        assert_eq!(dataset.policy_id(), binary.id());
    }

    #[test]
    fn test_reads_files_written_by_the_recorder() {
        let dir = TempDir::new().unwrap();
        let format: BattleFormat = "gen2ou".parse().unwrap();
        let written = write_corpus(dir.path(), format, 3, 5).unwrap();
        assert_eq!(written, 3);

        let mut dataset =
            ParsedReplayDataset::new(dir.path(), &[format], ObservationPolicy::default())
                .unwrap()
                .with_seed(1);
        assert_eq!(dataset.size(), 3);
        let batch = dataset.sample(5).unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.source, BatchSource::Offline);
    }

    #[test]
    fn test_inconsistent_replay_is_rejected() {
        let mut corpus = replays(1);
        corpus[0].actions.push(0);
        let result = ParsedReplayDataset::from_replays(corpus, ObservationPolicy::default());
        assert!(matches!(result, Err(Error::DataCorpus { .. })));
    }
}
