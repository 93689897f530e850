//! Game cache storage.
//!
//! The cache for a profile is one indented JSON array of games. Where it
//! lives is decided by its location string:
//! - `s3://bucket/key`: an object in an S3-compatible store
//! - anything else: a path on the local filesystem

pub mod local;
pub mod s3;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::models::{Game, GameFormatError, ProfileId};

pub use local::LocalStore;
pub use s3::{S3Options, S3Store};

const S3_SCHEME: &str = "s3://";

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed cached game: {0}")]
    Format(#[from] GameFormatError),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Object store error for {location}: {message}")]
    ObjectStore { location: String, message: String },
}

/// Where a cache document lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageLocation {
    Local(PathBuf),
    S3 { bucket: String, key: String },
}

impl StorageLocation {
    /// Route a location string to a backend.
    pub fn parse(location: &str) -> Result<Self, StorageError> {
        let Some(rest) = location.strip_prefix(S3_SCHEME) else {
            if location.trim().is_empty() {
                return Err(StorageError::InvalidPath("empty location".to_string()));
            }
            return Ok(StorageLocation::Local(PathBuf::from(location)));
        };

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        let key = key.trim_start_matches('/');
        match (bucket, key) {
            ("", _) | (_, "") => Err(StorageError::InvalidPath(format!(
                "{} (expected s3://bucket/key)",
                location
            ))),
            _ => Ok(StorageLocation::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Local(path) => write!(f, "{}", path.display()),
            StorageLocation::S3 { bucket, key } => write!(f, "{}{}/{}", S3_SCHEME, bucket, key),
        }
    }
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory or `s3://bucket/prefix` holding one cache per profile
    pub root: String,
}

impl StorageConfig {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn cache_file_name(profile_id: ProfileId) -> String {
        format!("player_games_{}.json", profile_id)
    }

    /// Check that the root names a usable directory or bucket.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.root.trim().is_empty() {
            return Err(StorageError::InvalidPath("empty storage root".to_string()));
        }
        if let Some(rest) = self.root.strip_prefix(S3_SCHEME) {
            if rest.split('/').next().unwrap_or_default().is_empty() {
                return Err(StorageError::InvalidPath(format!(
                    "{} (expected s3://bucket[/prefix])",
                    self.root
                )));
            }
        }
        Ok(())
    }

    /// Cache location for one profile.
    pub fn location_for(&self, profile_id: ProfileId) -> Result<StorageLocation, StorageError> {
        let file_name = Self::cache_file_name(profile_id);
        if self.root.starts_with(S3_SCHEME) {
            StorageLocation::parse(&format!(
                "{}/{}",
                self.root.trim_end_matches('/'),
                file_name
            ))
        } else {
            Ok(StorageLocation::Local(PathBuf::from(&self.root).join(file_name)))
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new("./data")
    }
}

/// Persistent get/put of a game cache.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Read the cache. A missing document is an empty history.
    async fn load(&self, location: &StorageLocation) -> Result<Vec<Game>, StorageError>;

    /// Overwrite the cache with `games`.
    async fn save(&self, location: &StorageLocation, games: &[Game]) -> Result<(), StorageError>;
}

/// Store that dispatches on the location kind.
///
/// The S3 client is only built the first time an `s3://` location is used.
pub struct Storage {
    local: LocalStore,
    s3_options: S3Options,
    s3: OnceCell<S3Store>,
}

impl Storage {
    pub fn new(s3_options: S3Options) -> Self {
        Self {
            local: LocalStore,
            s3_options,
            s3: OnceCell::new(),
        }
    }

    async fn s3(&self) -> &S3Store {
        self.s3
            .get_or_init(|| async {
                debug!("Initializing S3 client");
                S3Store::connect(&self.s3_options).await
            })
            .await
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new(S3Options::default())
    }
}

#[async_trait]
impl GameStore for Storage {
    async fn load(&self, location: &StorageLocation) -> Result<Vec<Game>, StorageError> {
        match location {
            StorageLocation::Local(_) => self.local.load(location).await,
            StorageLocation::S3 { .. } => self.s3().await.load(location).await,
        }
    }

    async fn save(&self, location: &StorageLocation, games: &[Game]) -> Result<(), StorageError> {
        match location {
            StorageLocation::Local(_) => self.local.save(location, games).await,
            StorageLocation::S3 { .. } => self.s3().await.save(location, games).await,
        }
    }
}

/// Serialize a cache document.
pub(crate) fn encode_games(games: &[Game]) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec_pretty(games)?)
}

/// Parse a cache document in either game shape.
pub(crate) fn decode_games(bytes: &[u8]) -> Result<Vec<Game>, StorageError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    Ok(crate::models::normalize_document(value)?)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_location() {
        assert_eq!(
            StorageLocation::parse("/tmp/player_games_1.json").unwrap(),
            StorageLocation::Local(PathBuf::from("/tmp/player_games_1.json"))
        );
        assert!(StorageLocation::parse("  ").is_err());
    }

    #[test]
    fn test_parse_s3_location() {
        assert_eq!(
            StorageLocation::parse("s3://my-bucket/cache/player_games_1.json").unwrap(),
            StorageLocation::S3 {
                bucket: "my-bucket".to_string(),
                key: "cache/player_games_1.json".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_s3_location_requires_bucket_and_key() {
        assert!(StorageLocation::parse("s3://").is_err());
        assert!(StorageLocation::parse("s3://bucket").is_err());
        assert!(StorageLocation::parse("s3://bucket/").is_err());
        assert!(StorageLocation::parse("s3:///key").is_err());
    }

    #[test]
    fn test_location_display_round_trips() {
        let text = "s3://bucket/a/b.json";
        assert_eq!(StorageLocation::parse(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_storage_config_local_location() {
        let config = StorageConfig::new("/data");
        assert_eq!(
            config.location_for(ProfileId::new(7)).unwrap(),
            StorageLocation::Local(PathBuf::from("/data/player_games_7.json"))
        );
    }

    #[test]
    fn test_storage_config_s3_location() {
        let config = StorageConfig::new("s3://games/cache/");
        assert_eq!(
            config.location_for(ProfileId::new(7)).unwrap(),
            StorageLocation::S3 {
                bucket: "games".to_string(),
                key: "cache/player_games_7.json".to_string(),
            }
        );

        let config = StorageConfig::new("s3://games");
        assert_eq!(
            config.location_for(ProfileId::new(7)).unwrap().to_string(),
            "s3://games/player_games_7.json"
        );
    }

    #[test]
    fn test_storage_config_validate() {
        assert!(StorageConfig::new("./data").validate().is_ok());
        assert!(StorageConfig::new("s3://games").validate().is_ok());
        assert!(StorageConfig::new("s3://games/cache/").validate().is_ok());
        assert!(StorageConfig::new("s3://").validate().is_err());
        assert!(StorageConfig::new("s3:///cache").validate().is_err());
        assert!(StorageConfig::new("").validate().is_err());
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.root, "./data");
    }

    #[test]
    fn test_decode_accepts_legacy_flat_games() {
        let doc = br#"[{"game_id": 1, "started_at": "2024-01-01T00:00:00Z", "players": [
            {"profile_id": 1, "name": "Alice", "team": 0, "won": true}
        ]}]"#;
        let games = decode_games(doc).unwrap();
        assert_eq!(games[0].teams[0][0].player.name, "Alice");
    }

    #[test]
    fn test_decode_rejects_non_array() {
        assert!(matches!(
            decode_games(br#"{"games": []}"#),
            Err(StorageError::Format(_))
        ));
    }

    #[test]
    fn test_cached_record_round_trips_unchanged() {
        let doc = serde_json::json!([{
            "game_id": 1,
            "started_at": "2024-01-01T00:00:00Z",
            "kind": "rm_1v1",
            "average_rating": 1200,
            "teams": [
                [{"player": {"profile_id": 1, "name": "Alice", "result": "win",
                    "civilization": "rus", "rating": 1200, "mmr": 1300}}],
                [{"player": {"profile_id": 2, "name": "Bob", "result": null,
                    "civilization": "french", "rating": 1180, "mmr": 1250}}]
            ]
        }]);
        let games = decode_games(doc.to_string().as_bytes()).unwrap();
        let saved: serde_json::Value =
            serde_json::from_slice(&encode_games(&games).unwrap()).unwrap();
        assert_eq!(saved, doc);
    }
}
