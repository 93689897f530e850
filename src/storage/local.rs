//! Filesystem cache backend.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{decode_games, encode_games, GameStore, StorageError, StorageLocation};
use crate::models::Game;

/// Stores each cache as a JSON file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl LocalStore {
    fn path(location: &StorageLocation) -> Result<&Path, StorageError> {
        match location {
            StorageLocation::Local(path) => Ok(path.as_path()),
            other => Err(StorageError::InvalidPath(format!(
                "{} is not a local path",
                other
            ))),
        }
    }

    /// Sibling file the new document is written to before the rename.
    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

#[async_trait]
impl GameStore for LocalStore {
    async fn load(&self, location: &StorageLocation) -> Result<Vec<Game>, StorageError> {
        let path = Self::path(location)?;
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cache at {:?}, starting empty", path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let games = decode_games(&bytes)?;
        debug!("Read {} games from {:?}", games.len(), path);
        Ok(games)
    }

    /// Write to a temporary sibling, then rename over the target.
    async fn save(&self, location: &StorageLocation, games: &[Game]) -> Result<(), StorageError> {
        let path = Self::path(location)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let content = encode_games(games)?;
        let temp = Self::temp_path(path);
        let mut file = fs::File::create(&temp).await?;
        file.write_all(&content).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, path).await?;
        info!("Wrote {} games to {:?}", games.len(), path);
        Ok(())
    }
}
