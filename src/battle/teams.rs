//! Team compositions and per-format team pools

use std::{
    fs,
    path::{Path, PathBuf},
};

use rand::{Rng, SeedableRng, prelude::IndexedRandom, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::{
    dex::{CreatureSpec, species_for_generation},
    format::BattleFormat,
};
use crate::{Error, Result};

/// Maximum party size
pub const TEAM_SIZE: usize = 6;

/// Maximum moves per creature
pub const MAX_MOVES: usize = 4;

/// A pre-built team composition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    /// Generation the team was built for
    pub generation: u8,
    pub members: Vec<CreatureSpec>,
}

impl Team {
    /// Check that the team is legal in `format`.
    pub fn validate_for(&self, format: BattleFormat) -> Result<()> {
        if self.generation != format.generation() {
            return Err(Error::TeamFormatMismatch {
                team: self.name.clone(),
                team_gen: self.generation,
                format: format.to_string(),
            });
        }
        if let Some(member) = self
            .members
            .iter()
            .find(|member| member.generation > format.generation())
        {
            return Err(Error::TeamFormatMismatch {
                team: format!("{} ({})", self.name, member.species),
                team_gen: member.generation,
                format: format.to_string(),
            });
        }
        if self.members.is_empty() || self.members.len() > TEAM_SIZE {
            return Err(Error::config(format!(
                "team '{}' has {} members (expected 1-{TEAM_SIZE})",
                self.name,
                self.members.len()
            )));
        }
        if let Some(member) = self
            .members
            .iter()
            .find(|member| member.moves.is_empty() || member.moves.len() > MAX_MOVES)
        {
            return Err(Error::config(format!(
                "team '{}': {} has {} moves (expected 1-{MAX_MOVES})",
                self.name,
                member.species,
                member.moves.len()
            )));
        }
        Ok(())
    }
}

/// A named pool of teams for one battle format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSet {
    format: BattleFormat,
    name: String,
    teams: Vec<Team>,
}

/// Built-in team set names
pub const BUILTIN_TEAM_SETS: [&str; 2] = ["paper_variety", "competitive"];

impl TeamSet {
    /// Create a team set, validating every team against the format.
    pub fn new(format: BattleFormat, name: impl Into<String>, teams: Vec<Team>) -> Result<Self> {
        let name = name.into();
        if teams.is_empty() {
            return Err(Error::config(format!(
                "team set '{name}' for {format} contains no teams"
            )));
        }
        for team in &teams {
            team.validate_for(format)?;
        }
        Ok(Self {
            format,
            name,
            teams,
        })
    }

    /// Resolve one of the built-in team sets for `format`.
    ///
    /// `paper_variety` draws eight varied teams from the generation's dex;
    /// `competitive` builds four teams from the strongest species.
    pub fn builtin(format: BattleFormat, set_name: &str) -> Result<Self> {
        let mut pool = species_for_generation(format.generation());
        let seed = u64::from(format.generation()) * 1_000 + set_name.len() as u64;
        let mut rng = StdRng::seed_from_u64(seed);

        let team_count = match set_name {
            "paper_variety" => 8,
            "competitive" => {
                pool.sort_by_key(|c| std::cmp::Reverse(c.hp + c.attack + c.defense + c.speed));
                pool.truncate(TEAM_SIZE + 2);
                4
            }
            other => {
                return Err(Error::config(format!(
                    "unknown team set '{other}'. Expected one of: {}",
                    BUILTIN_TEAM_SETS.join(", ")
                )));
            }
        };

        let teams = (0..team_count)
            .map(|index| {
                let mut members = pool.clone();
                members.shuffle(&mut rng);
                members.truncate(TEAM_SIZE);
                Team {
                    name: format!("{format}-{set_name}-{index}"),
                    generation: format.generation(),
                    members,
                }
            })
            .collect();

        Self::new(format, set_name, teams)
    }

    /// Load every `*.json` team file under `dir`.
    pub fn load_dir(format: BattleFormat, dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|source| Error::Io {
            operation: format!("read team directory {dir:?}"),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut teams = Vec::with_capacity(paths.len());
        for path in paths {
            let file = fs::File::open(&path).map_err(|source| Error::Io {
                operation: format!("open team file {path:?}"),
                source,
            })?;
            teams.push(serde_json::from_reader(file)?);
        }
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "custom".to_string());
        Self::new(format, name, teams)
    }

    pub fn format(&self) -> BattleFormat {
        self.format
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Draw a team uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &Team {
        // `new` guarantees at least one team
        self.teams.choose(rng).unwrap_or(&self.teams[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ou_format(n: u8) -> BattleFormat {
        format!("gen{n}ou").parse().unwrap()
    }

    #[test]
    fn test_builtin_sets_are_valid_for_their_format() {
        for generation in 1..=4 {
            for set in BUILTIN_TEAM_SETS {
                let teams = TeamSet::builtin(ou_format(generation), set).unwrap();
                assert!(!teams.teams().is_empty());
                for team in teams.teams() {
                    assert_eq!(team.members.len(), TEAM_SIZE);
                    team.validate_for(ou_format(generation)).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_builtin_sets_are_deterministic() {
        let a = TeamSet::builtin(ou_format(2), "paper_variety").unwrap();
        let b = TeamSet::builtin(ou_format(2), "paper_variety").unwrap();
        assert_eq!(a.teams(), b.teams());
    }

    #[test]
    fn test_wrong_generation_team_is_rejected() {
        let gen3_team = TeamSet::builtin(ou_format(3), "paper_variety").unwrap().teams()[0].clone();
        let err = TeamSet::new(ou_format(1), "mixed", vec![gen3_team]).unwrap_err();
        assert!(matches!(err, Error::TeamFormatMismatch { .. }));
    }

    #[test]
    fn test_unknown_set_is_rejected() {
        assert!(TeamSet::builtin(ou_format(1), "nonexistent").is_err());
    }
}
