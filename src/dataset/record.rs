//! Replay recording from scripted self-play
//!
//! Produces corpus files in the same layout [`super::ParsedReplayDataset`]
//! reads, which is how local corpora are bootstrapped without the remote
//! mirror.

use std::{fs, path::Path};

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::ParsedReplay;
use crate::{
    Error, Result,
    battle::{BattleFormat, BattleSession, Side, TeamSet},
    opponents::OpponentKind,
};

/// Play one battle between two scripted controllers and record it from
/// `player`'s side.
pub fn record_replay(
    format: BattleFormat,
    teams: &TeamSet,
    player: OpponentKind,
    opponent: OpponentKind,
    seed: u64,
) -> Result<ParsedReplay> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut player_ctl = player.instantiate(rng.random());
    let mut opponent_ctl = opponent.instantiate(rng.random());
    let player_team = teams.sample(&mut rng);
    let opponent_team = teams.sample(&mut rng);
    let mut session = BattleSession::new(format, player_team, opponent_team, rng.random())?;

    let mut states = vec![session.state(Side::Player)];
    let mut actions = Vec::new();
    while !session.is_over() {
        let action = player_ctl.act(&session.state(Side::Player));
        let reply = opponent_ctl.act(&session.state(Side::Opponent));
        session.step(action, reply)?;
        actions.push(action);
        states.push(session.state(Side::Player));
    }

    Ok(ParsedReplay {
        format,
        states,
        actions,
    })
}

/// Write `count` self-play replays to `{root}/{format}/`.
///
/// Player and opponent kinds rotate through the baseline roster. Returns the
/// number of files written.
pub fn write_corpus(root: &Path, format: BattleFormat, count: usize, seed: u64) -> Result<usize> {
    let dir = root.join(format.to_string());
    fs::create_dir_all(&dir).map_err(|source| Error::Io {
        operation: format!("create replay directory {dir:?}"),
        source,
    })?;
    let teams = TeamSet::builtin(format, "paper_variety")?;
    let kinds = crate::opponents::OpponentRoster::baseline();
    let kinds = kinds.list();

    for index in 0..count {
        let player = kinds[index % kinds.len()];
        let opponent = kinds[(index / kinds.len() + 1 + index) % kinds.len()];
        let replay = record_replay(format, &teams, player, opponent, seed + index as u64)?;

        let path = dir.join(format!("{format}-{seed}-{index:05}.json"));
        let file = fs::File::create(&path).map_err(|source| Error::Io {
            operation: format!("create replay file {path:?}"),
            source,
        })?;
        serde_json::to_writer(std::io::BufWriter::new(file), &replay)?;
    }
    tracing::info!(format = %format, count, dir = ?dir, "recorded replays");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_replay_ends_the_battle() {
        let format: BattleFormat = "gen3ou".parse().unwrap();
        let teams = TeamSet::builtin(format, "paper_variety").unwrap();
        let replay =
            record_replay(format, &teams, OpponentKind::EmeraldKaizo, OpponentKind::Grunt, 3)
                .unwrap();
        replay.validate().unwrap();
        assert!(replay.states.last().unwrap().is_terminal());
        assert!(!replay.actions.is_empty());
    }

    #[test]
    fn test_recording_is_deterministic() {
        let format: BattleFormat = "gen1ou".parse().unwrap();
        let teams = TeamSet::builtin(format, "paper_variety").unwrap();
        let a = record_replay(format, &teams, OpponentKind::Grunt, OpponentKind::Grunt, 9).unwrap();
        let b = record_replay(format, &teams, OpponentKind::Grunt, OpponentKind::Grunt, 9).unwrap();
        assert_eq!(a, b);
    }
}
