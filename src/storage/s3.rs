//! S3-compatible object store backend.
//!
//! Works against AWS S3 and against S3-compatible services such as
//! Cloudflare R2 or MinIO when an endpoint is configured. Credentials come
//! from the standard AWS provider chain.

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::{decode_games, encode_games, GameStore, StorageError, StorageLocation};
use crate::models::Game;

/// Connection settings for the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Options {
    /// Overrides the region from the environment
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,
}

/// Cache documents stored as objects.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub async fn connect(options: &S3Options) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &options.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &options.endpoint {
            debug!("Using S3 endpoint {}", endpoint);
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    fn object(location: &StorageLocation) -> Result<(&str, &str), StorageError> {
        match location {
            StorageLocation::S3 { bucket, key } => Ok((bucket.as_str(), key.as_str())),
            other => Err(StorageError::InvalidPath(format!(
                "{} is not an s3:// location",
                other
            ))),
        }
    }

    fn object_error(location: &StorageLocation, message: impl ToString) -> StorageError {
        StorageError::ObjectStore {
            location: location.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl GameStore for S3Store {
    async fn load(&self, location: &StorageLocation) -> Result<Vec<Game>, StorageError> {
        let (bucket, key) = Self::object(location)?;

        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                if err.is_no_such_key() {
                    debug!("No cache at {}, starting empty", location);
                    return Ok(Vec::new());
                }
                return Err(Self::object_error(location, DisplayErrorContext(&err)));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| Self::object_error(location, e))?
            .into_bytes();

        let games = decode_games(&bytes)?;
        debug!("Read {} games from {}", games.len(), location);
        Ok(games)
    }

    async fn save(&self, location: &StorageLocation, games: &[Game]) -> Result<(), StorageError> {
        let (bucket, key) = Self::object(location)?;
        let content = encode_games(games)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| Self::object_error(location, DisplayErrorContext(&e)))?;

        info!("Wrote {} games to {}", games.len(), location);
        Ok(())
    }
}
