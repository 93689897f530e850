//! Derived statistics models.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ProfileId;

/// Overall record of the target player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub total: u32,
    pub wins: u32,
    pub losses: u32,
}

/// Record of the target player with one civilization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CivStat {
    pub total: u32,
    pub wins: u32,
    pub losses: u32,

    /// Percentage, 0.0 to 100.0
    pub win_rate: f64,
}

/// Record shared with another player, from the target's point of view for
/// allies and from the other player's point of view for opponents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonStat {
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
}

/// Named entries kept in a fixed order.
///
/// Serializes as a JSON object whose keys appear in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedStats<T> {
    entries: Vec<(String, T)>,
}

impl<T> RankedStats<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn from_entries(entries: Vec<(String, T)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, stat)| stat)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, stat)| (n.as_str(), stat))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// The first `n` entries.
    pub fn top(&self, n: usize) -> impl Iterator<Item = (&str, &T)> {
        self.iter().take(n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for RankedStats<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Serialize for RankedStats<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, stat) in &self.entries {
            map.serialize_entry(name, stat)?;
        }
        map.end()
    }
}

struct RankedStatsVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for RankedStatsVisitor<T> {
    type Value = RankedStats<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of name to statistics")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, stat)) = access.next_entry::<String, T>()? {
            entries.push((name, stat));
        }
        Ok(RankedStats { entries })
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RankedStats<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RankedStatsVisitor(PhantomData))
    }
}

/// Aggregate statistics for one profile over a game list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub match_stats: MatchStats,

    /// Sorted by `total`, descending
    pub civ_stats: RankedStats<CivStat>,

    /// Sorted by `games`, descending
    pub allies: RankedStats<PersonStat>,

    /// Sorted by `games`, descending
    pub opponents: RankedStats<PersonStat>,
}

/// Count of games per length band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationDistribution {
    /// Under 10 minutes
    pub very_short: u32,
    /// 10 to 20 minutes
    pub short: u32,
    /// 20 to 30 minutes
    pub medium: u32,
    /// 30 to 40 minutes
    pub long: u32,
    /// 40 minutes or more
    pub very_long: u32,
}

/// Time- and map-oriented statistics for one profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendStats {
    pub map_stats: RankedStats<PersonStat>,
    pub duration_distribution: DurationDistribution,

    /// `m:ss`, or `-` when no game carries a duration
    pub average_game_length: String,

    pub longest_game_seconds: u64,
    pub current_win_streak: u32,
    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,

    /// Rounded percentage over the 10 most recent games
    pub win_rate_last_10: u32,

    /// Rounded percentage over the 50 most recent games
    pub win_rate_last_50: u32,
}

/// Everything returned for one profile by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileReport {
    pub profile_id: ProfileId,
    pub games_count: usize,
    pub new_games: usize,
    pub analysis: AnalysisResult,
    pub trends: TrendStats,
}
