//! Statistics calculation engine.
//!
//! Computes per-profile metrics from a game list:
//! - Overall wins and losses
//! - Civilization win rates
//! - Ally and opponent tallies
//! - Map, duration and streak trends (see [`trends`])

pub mod trends;

use std::collections::HashMap;

use serde_json::Value;

use crate::models::{
    normalize_document, AnalysisResult, CivStat, Game, GameFormatError, MatchStats, PersonStat,
    ProfileId, RankedStats,
};

pub use trends::analyze_trends;

/// Calculate a win rate as a percentage of `total`.
pub fn calculate_win_rate(wins: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64 * 100.0
    }
}

/// Per-name accumulator that remembers first-seen order.
pub(crate) struct Tally<T> {
    entries: Vec<(String, T)>,
    index: HashMap<String, usize>,
}

impl<T: Default> Tally<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn entry(&mut self, name: &str) -> &mut T {
        let slot = match self.index.get(name) {
            Some(&i) => i,
            None => {
                self.entries.push((name.to_string(), T::default()));
                self.index.insert(name.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[slot].1
    }

    /// Sort descending by `key`. Equal keys keep first-seen order.
    pub(crate) fn into_ranked<K: Ord>(self, key: impl Fn(&T) -> K) -> RankedStats<T> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| key(&b.1).cmp(&key(&a.1)));
        RankedStats::from_entries(entries)
    }
}

impl PersonStat {
    pub(crate) fn record(&mut self, won: bool) {
        self.games += 1;
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
    }
}

/// Compute match, civilization, ally and opponent statistics for `profile_id`.
///
/// Games the profile did not take part in are skipped. Allies are credited
/// with the profile's result; opponents with the inverse.
pub fn analyze(games: &[Game], profile_id: ProfileId) -> AnalysisResult {
    let mut match_stats = MatchStats::default();
    let mut civs: Tally<CivStat> = Tally::new();
    let mut allies: Tally<PersonStat> = Tally::new();
    let mut opponents: Tally<PersonStat> = Tally::new();

    for game in games {
        let Some((own_team, me)) = game.find_player(profile_id) else {
            continue;
        };
        let won = me.is_win();

        match_stats.total += 1;
        let civ = civs.entry(&me.civilization);
        civ.total += 1;
        if won {
            match_stats.wins += 1;
            civ.wins += 1;
        } else {
            match_stats.losses += 1;
            civ.losses += 1;
        }
        civ.win_rate = calculate_win_rate(civ.wins, civ.total);

        for (team_index, other) in game.players() {
            if other.profile_id == profile_id {
                continue;
            }
            if team_index == own_team {
                allies.entry(&other.name).record(won);
            } else {
                opponents.entry(&other.name).record(!won);
            }
        }
    }

    AnalysisResult {
        match_stats,
        civ_stats: civs.into_ranked(|c| c.total),
        allies: allies.into_ranked(|p| p.games),
        opponents: opponents.into_ranked(|p| p.games),
    }
}

/// Analyze an untyped JSON array of games in either upstream shape.
pub fn analyze_value(
    games: Value,
    profile_id: ProfileId,
) -> Result<AnalysisResult, GameFormatError> {
    let games = normalize_document(games)?;
    Ok(analyze(&games, profile_id))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::Map;

    use crate::models::{Game, GameId, GameResult, Player, ProfileId, TeamMember};

    pub fn member(id: u64, name: &str, result: GameResult, civ: &str) -> TeamMember {
        TeamMember::new(Player {
            profile_id: ProfileId::new(id),
            name: name.to_string(),
            result: Some(result),
            civilization: civ.to_string(),
            extra: Map::new(),
        })
    }

    pub fn game(id: u64, started_at: &str, teams: Vec<Vec<TeamMember>>) -> Game {
        Game::new(GameId::from(id), started_at, teams)
    }

    /// Alice (1) plays Britons twice: a win with Bob, then a loss with Eve.
    /// Carol opposes her both times.
    pub fn two_game_fixture() -> Vec<Game> {
        use GameResult::{Loss, Win};
        vec![
            game(
                1,
                "2024-01-01T10:00:00Z",
                vec![
                    vec![
                        member(1, "Alice", Win, "Britons"),
                        member(2, "Bob", Win, "Franks"),
                    ],
                    vec![
                        member(3, "Carol", Loss, "Goths"),
                        member(4, "Dave", Loss, "Vikings"),
                    ],
                ],
            ),
            game(
                2,
                "2024-01-02T10:00:00Z",
                vec![
                    vec![
                        member(1, "Alice", Loss, "Britons"),
                        member(5, "Eve", Loss, "Teutons"),
                    ],
                    vec![
                        member(3, "Carol", Win, "Goths"),
                        member(6, "Frank", Win, "Persians"),
                    ],
                ],
            ),
        ]
    }
}
