//! Sync pipeline.
//!
//! Brings a profile's cache up to date:
//! 1. Load the cached games
//! 2. Find the newest cached game (the high-water mark)
//! 3. Fetch everything played after it
//! 4. Merge, dropping games that are already cached
//! 5. Save, but only when something new arrived

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::calculate::{analyze, analyze_trends};
use crate::fetch::{fetch_new_games, FetchError, GameSource, StopReason};
use crate::models::{Game, GameId, ProfileId, ProfileReport};
use crate::storage::{GameStore, StorageError, StorageLocation};

/// Default cap on pages requested in one sync.
pub const DEFAULT_MAX_PAGES: u32 = 500;

/// Errors that can occur during sync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The newest cached game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighWaterMark {
    /// Forwarded upstream as `since`
    pub started_at: String,
    /// Fetching stops when this game shows up
    pub game_id: GameId,
}

impl HighWaterMark {
    /// Pick the game with the latest `started_at`. The first one wins ties.
    pub fn from_games(games: &[Game]) -> Option<Self> {
        let mut newest: Option<(Option<DateTime<Utc>>, &Game)> = None;
        for game in games {
            let key = game.started_at_utc();
            let newer = match &newest {
                None => true,
                Some((best_key, best)) => {
                    (key, game.started_at.as_str()) > (*best_key, best.started_at.as_str())
                }
            };
            if newer {
                newest = Some((key, game));
            }
        }

        newest.map(|(_, game)| Self {
            started_at: game.started_at.clone(),
            game_id: game.game_id.clone(),
        })
    }
}

/// Result of one sync.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The full merged history
    pub games: Vec<Game>,

    /// How many games were added to the cache
    pub new_games: usize,

    pub stop: StopReason,
}

/// Append the fetched games that are not cached yet. Returns the number added.
fn merge(existing: &mut Vec<Game>, fetched: Vec<Game>) -> usize {
    let mut seen: HashSet<GameId> = existing.iter().map(|g| g.game_id.clone()).collect();
    let before = existing.len();
    for game in fetched {
        if seen.insert(game.game_id.clone()) {
            existing.push(game);
        }
    }
    existing.len() - before
}

/// Bring the cache at `location` up to date for `profile_id`.
pub async fn sync_profile(
    source: &dyn GameSource,
    store: &dyn GameStore,
    location: &StorageLocation,
    profile_id: ProfileId,
    max_pages: u32,
) -> Result<SyncOutcome, SyncError> {
    let mut games = store.load(location).await?;
    let mark = HighWaterMark::from_games(&games);
    info!(
        "Profile {}: {} cached games, newest {}",
        profile_id,
        games.len(),
        mark.as_ref().map(|m| m.started_at.as_str()).unwrap_or("none")
    );

    let fetched = fetch_new_games(
        source,
        profile_id,
        mark.as_ref().map(|m| m.started_at.as_str()),
        mark.as_ref().map(|m| &m.game_id),
        max_pages,
    )
    .await?;
    if fetched.is_partial() {
        warn!(
            "Profile {}: fetch stopped early ({:?}), saving what arrived",
            profile_id, fetched.stop
        );
    }

    let new_games = merge(&mut games, fetched.games);
    if new_games > 0 {
        store.save(location, &games).await?;
        info!(
            "Profile {}: added {} games, {} total",
            profile_id,
            new_games,
            games.len()
        );
    } else {
        info!("Profile {}: cache already up to date", profile_id);
    }

    Ok(SyncOutcome {
        games,
        new_games,
        stop: fetched.stop,
    })
}

/// Sync the cache, then compute the profile's statistics over all of it.
pub async fn analyze_profile(
    source: &dyn GameSource,
    store: &dyn GameStore,
    location: &StorageLocation,
    profile_id: ProfileId,
    max_pages: u32,
) -> Result<ProfileReport, SyncError> {
    let outcome = sync_profile(source, store, location, profile_id, max_pages).await?;

    Ok(ProfileReport {
        profile_id,
        games_count: outcome.games.len(),
        new_games: outcome.new_games,
        analysis: analyze(&outcome.games, profile_id),
        trends: analyze_trends(&outcome.games, profile_id),
    })
}
