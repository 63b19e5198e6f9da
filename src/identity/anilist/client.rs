//! AniList HTTP client
//!
//! Handles communication with the AniList GraphQL endpoint.
//! See: https://docs.anilist.co/guide/graphql/
//!
//! AniList rate limits to 90 requests per minute; a 429 maps to
//! [`MetadataError::RateLimited`] and is never cached by the caller.

use std::time::Duration;

use async_trait::async_trait;

use super::{adapter, dto};
use crate::identity::{DEFAULT_LOOKUP_TIMEOUT, ExternalMatch, MetadataError, MetadataService};
use crate::merge::Normalizer;
use crate::source::truncate;

/// Public GraphQL endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://graphql.anilist.co";

/// How many candidates to score per lookup.
const RESULTS_PER_LOOKUP: u32 = 10;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = DEFAULT_LOOKUP_TIMEOUT;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// AniList API client
pub struct AniListClient {
    http_client: reqwest::Client,
    endpoint: String,
    normalizer: Normalizer,
}

impl AniListClient {
    /// Create a client for the public endpoint.
    pub fn new() -> Result<Self, MetadataError> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Create a client for a custom endpoint (mirrors, tests).
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, MetadataError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MetadataError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            normalizer: Normalizer::default(),
        })
    }

    /// Score titles with a custom normalizer (e.g. a configured synonym table).
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Search AniList and return the best-scoring media.
    pub async fn search(&self, title: &str) -> Result<Option<ExternalMatch>, MetadataError> {
        let response = self.send_search_request(title).await?;
        let media = response.data.map(|d| d.page.media).unwrap_or_default();
        Ok(adapter::best_match(title, &media, &self.normalizer))
    }

    /// Send the HTTP request and parse the response
    async fn send_search_request(&self, title: &str) -> Result<dto::SearchResponse, MetadataError> {
        let body = dto::GraphQlRequest {
            query: dto::SEARCH_QUERY,
            variables: dto::SearchVariables {
                search: title,
                per_page: RESULTS_PER_LOOKUP,
            },
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MetadataError::RateLimited);
        }

        // AniList answers 404 with a GraphQL error body when nothing matches.
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(dto::SearchResponse {
                data: None,
                errors: vec![],
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetadataError::Api(format!(
                "HTTP {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let parsed = response
            .json::<dto::SearchResponse>()
            .await
            .map_err(|e| MetadataError::Parse(e.to_string()))?;

        if parsed.data.is_none()
            && let Some(error) = parsed.errors.first()
        {
            return Err(MetadataError::Api(error.message.clone()));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl MetadataService for AniListClient {
    async fn lookup_by_title(
        &self,
        title: &str,
        min_confidence: f32,
    ) -> Result<Option<ExternalMatch>, MetadataError> {
        let found = self.search(title).await?;
        Ok(found.filter(|m| m.confidence >= min_confidence))
    }
}
