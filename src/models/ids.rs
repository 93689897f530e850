//! Player and game identifiers.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when a profile ID is absent or unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required parameter: profileId")]
    MissingProfileId,

    #[error("Invalid profileId {0:?}: expected a positive integer")]
    InvalidProfileId(String),
}

/// An upstream player identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(u64);

impl ProfileId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Coerce a loosely-typed JSON value (number or numeric string).
    ///
    /// `null` and empty strings count as missing, everything else that is not
    /// a positive integer is invalid.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValidationError> {
        match value {
            serde_json::Value::Null => Err(ValidationError::MissingProfileId),
            serde_json::Value::Number(n) => match n.as_u64() {
                Some(id) if id > 0 => Ok(Self(id)),
                _ => Err(ValidationError::InvalidProfileId(n.to_string())),
            },
            serde_json::Value::String(s) => s.parse(),
            other => Err(ValidationError::InvalidProfileId(other.to_string())),
        }
    }
}

impl FromStr for ProfileId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::MissingProfileId);
        }
        match s.parse::<u64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(ValidationError::InvalidProfileId(s.to_string())),
        }
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileId({})", self.0)
    }
}

impl From<u64> for ProfileId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An upstream game identifier.
///
/// The API has sent both numbers and strings over time; both compare equal
/// when their text matches. Purely numeric IDs serialize back as numbers.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "GameIdInner")]
pub struct GameId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn as_number(&self) -> Option<u64> {
        self.0
            .parse::<u64>()
            .ok()
            .filter(|n| n.to_string() == self.0)
    }
}

impl Serialize for GameId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_number() {
            Some(n) => serializer.serialize_u64(n),
            None => serializer.serialize_str(&self.0),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GameIdInner {
    Number(serde_json::Number),
    String(String),
}

impl From<GameIdInner> for GameId {
    fn from(inner: GameIdInner) -> Self {
        Self(match inner {
            GameIdInner::Number(n) => n.to_string(),
            GameIdInner::String(s) => s,
        })
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GameId({})", self.0)
    }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for GameId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}
