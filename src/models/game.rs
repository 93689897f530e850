//! Match records as returned by the upstream API.
//!
//! Two shapes have been served over the API's lifetime:
//!
//! - **nested**: `teams: [[{ "player": { profile_id, name, result, civilization } }]]`
//! - **flat** (legacy): `players: [{ profile_id, name, team, won }]`
//!
//! Both are parsed into [`GameShape`] and normalized into the nested [`Game`],
//! which is the only representation the rest of the crate works with.
//! Fields the crate does not model are carried in `extra` so a cached record
//! serializes back to what the upstream sent.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{GameId, ProfileId};

/// Errors for game records that cannot be normalized.
#[derive(Debug, Error)]
pub enum GameFormatError {
    #[error("expected a JSON array of games, got {0}")]
    NotAnArray(&'static str),

    #[error("game #{index}: expected a JSON object")]
    NotAnObject { index: usize },

    #[error("game #{index}: missing key `{key}`")]
    MissingKey { index: usize, key: &'static str },

    #[error("game #{index}: {source}")]
    Invalid {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of a game from one player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    #[serde(rename = "noresult")]
    NoResult,
    #[serde(other)]
    Unknown,
}

impl GameResult {
    pub fn is_win(&self) -> bool {
        matches!(self, GameResult::Win)
    }
}

/// `result` must be present but may be `null` for unresolved games.
fn nullable_result<'de, D>(deserializer: D) -> Result<Option<GameResult>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<GameResult>::deserialize(deserializer)
}

/// A participant in a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub profile_id: ProfileId,

    /// Display name at the time of the game. Names can change between games.
    pub name: String,

    /// `None` while the game is unresolved.
    #[serde(deserialize_with = "nullable_result")]
    pub result: Option<GameResult>,

    pub civilization: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Player {
    /// Anything but a recorded win counts as a loss.
    pub fn is_win(&self) -> bool {
        self.result.is_some_and(|r| r.is_win())
    }
}

/// One slot in a team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub player: Player,
}

impl TeamMember {
    pub fn new(player: Player) -> Self {
        Self { player }
    }
}

/// Key the upstream used for a game's identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdKey {
    #[default]
    GameId,
    Id,
}

impl IdKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKey::GameId => "game_id",
            IdKey::Id => "id",
        }
    }
}

/// A match in canonical (nested) form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Game {
    #[serde(alias = "id")]
    pub game_id: GameId,

    #[serde(skip)]
    pub id_key: IdKey,

    /// RFC 3339 start time, kept verbatim so it can be passed back as `since`.
    pub started_at: String,

    #[serde(default)]
    pub map: Option<String>,

    /// Length in seconds
    #[serde(default)]
    pub duration: Option<u64>,

    pub teams: Vec<Vec<TeamMember>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Serialize for Game {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_map(None)?;
        record.serialize_entry(self.id_key.as_str(), &self.game_id)?;
        record.serialize_entry("started_at", &self.started_at)?;
        if let Some(map) = &self.map {
            record.serialize_entry("map", map)?;
        }
        if let Some(duration) = &self.duration {
            record.serialize_entry("duration", duration)?;
        }
        record.serialize_entry("teams", &self.teams)?;
        for (key, value) in &self.extra {
            record.serialize_entry(key, value)?;
        }
        record.end()
    }
}

impl Game {
    pub fn new(
        game_id: GameId,
        started_at: impl Into<String>,
        teams: Vec<Vec<TeamMember>>,
    ) -> Self {
        Self {
            game_id,
            id_key: IdKey::default(),
            started_at: started_at.into(),
            map: None,
            duration: None,
            teams,
            extra: Map::new(),
        }
    }

    /// Parsed start time, if the upstream string is valid RFC 3339.
    pub fn started_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.started_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Locate a profile: the index of its team and its player record.
    pub fn find_player(&self, profile_id: ProfileId) -> Option<(usize, &Player)> {
        self.teams.iter().enumerate().find_map(|(team_index, team)| {
            team.iter()
                .find(|member| member.player.profile_id == profile_id)
                .map(|member| (team_index, &member.player))
        })
    }

    /// Every player with the index of the team they played on.
    pub fn players(&self) -> impl Iterator<Item = (usize, &Player)> {
        self.teams.iter().enumerate().flat_map(|(team_index, team)| {
            team.iter().map(move |member| (team_index, &member.player))
        })
    }
}

/// Legacy flat player entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FlatPlayer {
    pub profile_id: ProfileId,
    pub name: String,
    pub team: i64,
    #[serde(default)]
    pub won: bool,
    #[serde(default, alias = "civ")]
    pub civilization: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Legacy flat game record.
#[derive(Debug, Clone, Deserialize)]
pub struct FlatGame {
    #[serde(alias = "id")]
    pub game_id: GameId,
    #[serde(skip)]
    pub id_key: IdKey,
    pub started_at: String,
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    pub players: Vec<FlatPlayer>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlatGame {
    /// Group players into teams by their `team` value, in order of first
    /// appearance. Unmodeled fields move onto the normalized records.
    pub fn into_game(self) -> Game {
        let mut team_keys: Vec<i64> = Vec::new();
        let mut teams: Vec<Vec<TeamMember>> = Vec::new();

        for p in self.players {
            let slot = match team_keys.iter().position(|&t| t == p.team) {
                Some(i) => i,
                None => {
                    team_keys.push(p.team);
                    teams.push(Vec::new());
                    teams.len() - 1
                }
            };
            teams[slot].push(TeamMember::new(Player {
                profile_id: p.profile_id,
                name: p.name,
                result: Some(if p.won {
                    GameResult::Win
                } else {
                    GameResult::Loss
                }),
                civilization: p.civilization.unwrap_or_else(|| "unknown".to_string()),
                extra: p.extra,
            }));
        }

        Game {
            game_id: self.game_id,
            id_key: self.id_key,
            started_at: self.started_at,
            map: self.map,
            duration: self.duration,
            teams,
            extra: self.extra,
        }
    }
}

/// A game record in whichever shape the upstream sent it.
#[derive(Debug, Clone)]
pub enum GameShape {
    Nested(Game),
    Flat(FlatGame),
}

impl GameShape {
    /// Classify and parse one record. `index` is only used in error messages.
    pub fn from_value(index: usize, value: Value) -> Result<Self, GameFormatError> {
        let obj = value
            .as_object()
            .ok_or(GameFormatError::NotAnObject { index })?;

        let id_key = if obj.contains_key("game_id") {
            IdKey::GameId
        } else if obj.contains_key("id") {
            IdKey::Id
        } else {
            return Err(GameFormatError::MissingKey {
                index,
                key: "game_id",
            });
        };
        if !obj.contains_key("started_at") {
            return Err(GameFormatError::MissingKey {
                index,
                key: "started_at",
            });
        }

        let invalid = |source| GameFormatError::Invalid { index, source };
        if obj.contains_key("teams") {
            let mut game: Game = serde_json::from_value(value).map_err(invalid)?;
            game.id_key = id_key;
            Ok(GameShape::Nested(game))
        } else if obj.contains_key("players") {
            let mut game: FlatGame = serde_json::from_value(value).map_err(invalid)?;
            game.id_key = id_key;
            Ok(GameShape::Flat(game))
        } else {
            Err(GameFormatError::MissingKey {
                index,
                key: "teams",
            })
        }
    }

    pub fn into_game(self) -> Game {
        match self {
            GameShape::Nested(game) => game,
            GameShape::Flat(flat) => flat.into_game(),
        }
    }
}

/// Normalize a list of raw records, failing on the first malformed one.
pub fn normalize_games(values: Vec<Value>) -> Result<Vec<Game>, GameFormatError> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| GameShape::from_value(index, value).map(GameShape::into_game))
        .collect()
}

/// Normalize a JSON document that must be an array of game records.
pub fn normalize_document(value: Value) -> Result<Vec<Game>, GameFormatError> {
    match value {
        Value::Array(items) => normalize_games(items),
        Value::Null => Err(GameFormatError::NotAnArray("null")),
        Value::Object(_) => Err(GameFormatError::NotAnArray("an object")),
        _ => Err(GameFormatError::NotAnArray("a scalar")),
    }
}
