//! Identity resolution: display title -> stable external id.
//!
//! The [`IdentityCache`] asks a [`MetadataService`] (AniList in production)
//! for the best fuzzy match of a title and remembers the answer for a long
//! time, since bindings almost never change. Callers treat
//! [`IdentityResolution::Unresolved`] as a normal outcome and fall back to
//! title-keyed caching.
//!
//! # Architecture
//!
//! - **Service trait** ([`MetadataService`]) - the single lookup operation
//! - **AniList client** (`anilist/`) - DTOs, adapter and HTTP client
//! - **Cache** ([`IdentityCache`]) - TTL-cached resolution with a short
//!   negative cache for not-found answers

pub mod anilist;
#[cfg(test)]
pub mod mocks;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::{Namespace, TtlCache};
use crate::merge::Normalizer;
use crate::model::ExternalId;

pub use anilist::AniListClient;

/// Default minimum confidence (0.0 to 1.0) for accepting a match.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.8;

/// Default TTL for "no match" answers.
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default bound on a single metadata lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Best match returned by the metadata service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalMatch {
    pub external_id: ExternalId,
    /// Match confidence (0.0 to 1.0)
    pub confidence: f32,
    /// Title of the matched entry, for display
    pub matched_title: String,
}

/// Errors from the metadata service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetadataError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API request failed: {0}")]
    Api(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// External metadata lookup.
///
/// Implement this trait to plug in another metadata provider or a mock.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Best match for `title`, or `None` if nothing reaches `min_confidence`.
    async fn lookup_by_title(
        &self,
        title: &str,
        min_confidence: f32,
    ) -> Result<Option<ExternalMatch>, MetadataError>;
}

/// Outcome of an identity lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityResolution {
    Resolved(ExternalMatch),
    Unresolved,
}

impl IdentityResolution {
    pub fn external_id(&self) -> Option<&ExternalId> {
        match self {
            IdentityResolution::Resolved(m) => Some(&m.external_id),
            IdentityResolution::Unresolved => None,
        }
    }
}

/// Stored form of a resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CachedIdentity {
    Bound(ExternalMatch),
    NotFound,
}

/// Identity cache settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentityOptions {
    pub min_confidence: f32,
    /// TTL for not-found answers; zero disables negative caching
    pub negative_ttl: Duration,
    /// Upper bound on one service call; a timeout counts as a transport error
    pub lookup_timeout: Duration,
}

impl Default for IdentityOptions {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            negative_ttl: DEFAULT_NEGATIVE_TTL,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

/// Title -> external id resolution backed by the TTL cache.
///
/// Holds no state of its own beyond the shared cache.
pub struct IdentityCache {
    cache: Arc<TtlCache>,
    service: Option<Arc<dyn MetadataService>>,
    normalizer: Normalizer,
    options: IdentityOptions,
}

impl IdentityCache {
    pub fn new(
        cache: Arc<TtlCache>,
        service: Arc<dyn MetadataService>,
        normalizer: Normalizer,
        options: IdentityOptions,
    ) -> Self {
        Self {
            cache,
            service: Some(service),
            normalizer,
            options,
        }
    }

    /// An identity cache that never resolves (no metadata service configured).
    pub fn disabled(cache: Arc<TtlCache>, normalizer: Normalizer) -> Self {
        Self {
            cache,
            service: None,
            normalizer,
            options: IdentityOptions::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    /// Resolve a title to its external id, if one can be found.
    pub async fn resolve_external_id(&self, display_title: &str) -> Option<ExternalId> {
        match self.resolve(display_title).await {
            IdentityResolution::Resolved(m) => Some(m.external_id),
            IdentityResolution::Unresolved => None,
        }
    }

    /// Resolve a title, consulting the cache first.
    pub async fn resolve(&self, display_title: &str) -> IdentityResolution {
        let Some(service) = &self.service else {
            return IdentityResolution::Unresolved;
        };

        let key = self.normalizer.normalize(display_title);
        if key.is_empty() {
            return IdentityResolution::Unresolved;
        }

        match self
            .cache
            .get::<CachedIdentity>(Namespace::Identity, key.as_str())
            .await
        {
            Some(CachedIdentity::Bound(found)) => return IdentityResolution::Resolved(found),
            Some(CachedIdentity::NotFound) => {
                tracing::debug!(title = display_title, "Identity negatively cached");
                return IdentityResolution::Unresolved;
            }
            None => {}
        }

        let min_confidence = self.options.min_confidence;
        let lookup_timeout = self.options.lookup_timeout;
        let answer = tokio::time::timeout(
            lookup_timeout,
            service.lookup_by_title(display_title, min_confidence),
        )
        .await
        .unwrap_or(Err(MetadataError::Timeout(lookup_timeout)));

        match answer {
            Ok(Some(found)) if found.confidence >= min_confidence => {
                tracing::debug!(
                    title = display_title,
                    external_id = %found.external_id,
                    confidence = found.confidence,
                    "Resolved identity"
                );
                self.cache
                    .set_default(Namespace::Identity, key.as_str(), &CachedIdentity::Bound(found.clone()))
                    .await;
                IdentityResolution::Resolved(found)
            }
            Ok(low_or_none) => {
                if let Some(low) = low_or_none {
                    tracing::debug!(
                        title = display_title,
                        confidence = low.confidence,
                        "Identity match below confidence threshold"
                    );
                }
                if !self.options.negative_ttl.is_zero() {
                    self.cache
                        .set(
                            Namespace::Identity,
                            key.as_str(),
                            &CachedIdentity::NotFound,
                            self.options.negative_ttl,
                        )
                        .await;
                }
                IdentityResolution::Unresolved
            }
            Err(e) => {
                // Transport errors are never cached.
                tracing::warn!(title = display_title, "Identity lookup failed: {}", e);
                IdentityResolution::Unresolved
            }
        }
    }
}
