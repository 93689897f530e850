use std::sync::Arc;

use tracing::error;

use crate::api::ApiError;
use crate::fetch::GameSource;
use crate::models::{ProfileId, ProfileReport};
use crate::storage::{GameStore, StorageConfig};
use crate::sync::analyze_profile;

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn GameSource>,
    pub store: Arc<dyn GameStore>,
    pub storage: Arc<StorageConfig>,
    pub max_pages: u32,
}

impl AppState {
    /// Sync and analyze one profile. Pipeline failures become 500s.
    pub async fn analyze(&self, profile_id: ProfileId) -> Result<ProfileReport, ApiError> {
        let location = self
            .storage
            .location_for(profile_id)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        analyze_profile(
            self.source.as_ref(),
            self.store.as_ref(),
            &location,
            profile_id,
            self.max_pages,
        )
        .await
        .map_err(|e| {
            error!("Analysis failed for profile {}: {}", profile_id, e);
            ApiError::Internal(e.to_string())
        })
    }
}
