//! Incremental match history fetching.
//!
//! Pages through `GET {base_url}/players/{profile_id}/games` until the
//! upstream runs dry or a game that is already cached shows up.
//! The page source sits behind [`GameSource`] so the pagination logic can be
//! driven by an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::{normalize_games, Game, GameFormatError, GameId, ProfileId};

/// Errors that can occur during fetching.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid user agent: {0:?}")]
    InvalidUserAgent(String),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Upstream returned no data for profile {0} (expected a games envelope)")]
    EmptyEnvelope(ProfileId),

    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("Malformed game: {0}")]
    Format(#[from] GameFormatError),
}

/// Which response body layout the upstream is expected to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseShape {
    /// Accept either layout.
    #[default]
    Auto,
    /// A bare JSON array of games.
    Array,
    /// `{games, total_count, offset, count}`
    Envelope,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    games: Vec<Value>,
    total_count: Option<u64>,
    offset: Option<u64>,
    count: Option<u64>,
}

/// One page of upstream results.
#[derive(Debug, Clone, Default)]
pub struct GamesPage {
    pub games: Vec<Game>,
    pub total_count: Option<u64>,
    pub offset: Option<u64>,
    pub count: Option<u64>,
}

impl GamesPage {
    pub fn from_games(games: Vec<Game>) -> Self {
        Self {
            games,
            ..Default::default()
        }
    }

    /// True when the envelope counters say nothing is left after this page.
    pub fn is_last(&self) -> bool {
        match (self.total_count, self.offset, self.count) {
            (Some(total), Some(offset), Some(count)) => offset.saturating_add(count) >= total,
            _ => false,
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

impl ResponseShape {
    /// Decode one response body.
    ///
    /// In envelope mode a first page without any data is an integrity error;
    /// an envelope with an empty `games` list just means there is nothing new.
    pub fn parse_page(
        &self,
        body: &str,
        profile_id: ProfileId,
        first_page: bool,
    ) -> Result<GamesPage, FetchError> {
        let value: Value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body)?
        };

        match (self, value) {
            (ResponseShape::Envelope, value) if is_blank(&value) => {
                if first_page {
                    Err(FetchError::EmptyEnvelope(profile_id))
                } else {
                    Ok(GamesPage::default())
                }
            }
            (ResponseShape::Envelope | ResponseShape::Auto, value @ Value::Object(_)) => {
                let envelope: Envelope = serde_json::from_value(value)?;
                Ok(GamesPage {
                    games: normalize_games(envelope.games)?,
                    total_count: envelope.total_count,
                    offset: envelope.offset,
                    count: envelope.count,
                })
            }
            (ResponseShape::Array | ResponseShape::Auto, Value::Array(items)) => {
                Ok(GamesPage::from_games(normalize_games(items)?))
            }
            (ResponseShape::Array | ResponseShape::Auto, Value::Null) => Ok(GamesPage::default()),
            (shape, other) => Err(FetchError::UnexpectedShape(format!(
                "{:?} response cannot be {}",
                shape,
                match other {
                    Value::Array(_) => "an array",
                    Value::Object(_) => "an object",
                    _ => "a scalar",
                }
            ))),
        }
    }
}

/// Parameters for one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub profile_id: ProfileId,
    pub page: u32,
    pub since: Option<String>,
}

/// Source of paginated games for a profile.
#[async_trait]
pub trait GameSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &'static str;

    /// Fetch one page. Non-success statuses come back as
    /// [`FetchError::HttpStatus`].
    async fn fetch_page(&self, request: &PageRequest) -> Result<GamesPage, FetchError>;
}

/// Configuration for the HTTP game source.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// API root, e.g. `https://aoe4world.com/api/v0`
    pub base_url: String,

    /// Request timeout
    pub timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Expected response layout
    pub response_shape: ResponseShape,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://aoe4world.com/api/v0".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("civ-ledger/", env!("CARGO_PKG_VERSION")).to_string(),
            response_shape: ResponseShape::Auto,
        }
    }
}

/// Game source backed by the upstream HTTP API.
pub struct HttpGameSource {
    client: Client,
    config: FetcherConfig,
}

impl HttpGameSource {
    /// Create a new source with the given configuration.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|_| FetchError::InvalidUserAgent(config.user_agent.clone()))?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a source with default configuration.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(FetcherConfig::default())
    }

    /// Build the URL for one page.
    pub fn page_url(&self, request: &PageRequest) -> Result<Url, FetchError> {
        let raw = format!(
            "{}/players/{}/games",
            self.config.base_url.trim_end_matches('/'),
            request.profile_id
        );
        let mut url =
            Url::parse(&raw).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", raw, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &request.page.to_string());
            if let Some(since) = &request.since {
                query.append_pair("since", since);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl GameSource for HttpGameSource {
    fn name(&self) -> &'static str {
        "aoe4world"
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<GamesPage, FetchError> {
        let url = self.page_url(request)?;
        debug!("Fetching {}", url);

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: if body.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown").to_string()
                } else {
                    body.chars().take(200).collect()
                },
            });
        }

        let body = response.text().await?;
        self.config
            .response_shape
            .parse_page(&body, request.profile_id, request.page == 1)
    }
}

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum StopReason {
    /// An empty page came back.
    Exhausted,
    /// The envelope counters reported the final page.
    LastPage,
    /// The most recently cached game was found.
    ReachedCached,
    /// The upstream answered with a non-success status; results are partial.
    UpstreamStatus { status: u16 },
    /// The configured page cap was hit; results may be partial.
    PageLimit,
}

/// Games gathered by one pagination pass.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// New games in upstream order
    pub games: Vec<Game>,

    /// Number of page requests made
    pub pages: u32,

    pub stop: StopReason,
}

impl FetchOutcome {
    /// Whether pagination was cut short before reaching known or final data.
    pub fn is_partial(&self) -> bool {
        matches!(
            self.stop,
            StopReason::UpstreamStatus { .. } | StopReason::PageLimit
        )
    }
}

/// Fetch the games played since the cached high-water mark.
///
/// `since` is forwarded to the upstream; `until_game_id` is the newest cached
/// game and everything from it onwards is dropped. A non-success upstream
/// status ends the pass with what was gathered so far.
pub async fn fetch_new_games(
    source: &dyn GameSource,
    profile_id: ProfileId,
    since: Option<&str>,
    until_game_id: Option<&GameId>,
    max_pages: u32,
) -> Result<FetchOutcome, FetchError> {
    let mut games: Vec<Game> = Vec::new();
    let mut page = 1u32;

    let stop = loop {
        if page > max_pages {
            warn!(
                "{}: stopping after {} pages for profile {}",
                source.name(),
                max_pages,
                profile_id
            );
            break StopReason::PageLimit;
        }

        let request = PageRequest {
            profile_id,
            page,
            since: since.map(str::to_string),
        };

        let batch = match source.fetch_page(&request).await {
            Ok(batch) => batch,
            Err(FetchError::HttpStatus { status, message }) => {
                warn!(
                    "{}: page {} for profile {} failed with HTTP {} ({}); keeping {} games fetched so far",
                    source.name(),
                    page,
                    profile_id,
                    status,
                    message,
                    games.len()
                );
                break StopReason::UpstreamStatus { status };
            }
            Err(e) => return Err(e),
        };

        debug!(
            "{}: page {} returned {} games",
            source.name(),
            page,
            batch.games.len()
        );

        if batch.games.is_empty() {
            break StopReason::Exhausted;
        }

        if let Some(until) = until_game_id {
            if let Some(pos) = batch.games.iter().position(|g| &g.game_id == until) {
                games.extend(batch.games.into_iter().take(pos));
                break StopReason::ReachedCached;
            }
        }

        let last = batch.is_last();
        games.extend(batch.games);
        if last {
            break StopReason::LastPage;
        }
        page += 1;
    };

    let pages = match stop {
        StopReason::PageLimit => max_pages,
        _ => page,
    };
    info!(
        "{}: fetched {} new games for profile {} in {} pages ({:?})",
        source.name(),
        games.len(),
        profile_id,
        pages,
        stop
    );

    Ok(FetchOutcome { games, pages, stop })
}
