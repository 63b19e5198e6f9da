//! Test utilities and fixtures for anisource tests.
//!
//! Builders for registries, orchestrators and records so individual tests
//! only spell out what they are about.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::test_orchestrator;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
//!     let (orchestrator, cache) = test_orchestrator(vec![alpha]);
//!     // ... test logic
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::cache::{CacheOptions, TtlCache};
use crate::identity::mocks::MockMetadata;
use crate::identity::{IdentityCache, IdentityOptions};
use crate::merge::Normalizer;
use crate::model::{Candidate, CanonicalRecord, EpisodeSet, SourceId};
use crate::orchestrator::{OrchestratorOptions, SourceOrchestrator};
use crate::source::mocks::MockSource;
use crate::source::{Source, SourceRegistry};

/// Source timeout used by test orchestrators.
pub const TEST_SOURCE_TIMEOUT: Duration = Duration::from_millis(500);

/// Metadata lookup timeout used by test orchestrators.
pub const TEST_LOOKUP_TIMEOUT: Duration = Duration::from_millis(300);

/// Creates a cache persisted in a temporary directory.
///
/// Keep the `TempDir` alive for the duration of your test.
pub fn temp_cache() -> (Arc<TtlCache>, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let cache = Arc::new(TtlCache::new(CacheOptions::in_directory(dir.path())));
    (cache, dir)
}

/// Registry holding the given mocks, in order.
pub fn registry_of(sources: Vec<Arc<MockSource>>) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for source in sources {
        registry
            .register(source as Arc<dyn Source>)
            .expect("Duplicate mock source id");
    }
    registry
}

/// Orchestrator over mocks with an in-memory cache and no identity service.
pub fn test_orchestrator(sources: Vec<Arc<MockSource>>) -> (SourceOrchestrator, Arc<TtlCache>) {
    let cache = Arc::new(TtlCache::in_memory());
    let identity = Arc::new(IdentityCache::disabled(cache.clone(), Normalizer::default()));
    (build(sources, cache.clone(), identity), cache)
}

/// Orchestrator over mocks whose identity cache asks `metadata`.
pub fn test_orchestrator_with_identity(
    sources: Vec<Arc<MockSource>>,
    metadata: Arc<MockMetadata>,
) -> (SourceOrchestrator, Arc<TtlCache>) {
    let cache = Arc::new(TtlCache::in_memory());
    let identity = Arc::new(IdentityCache::new(
        cache.clone(),
        metadata,
        Normalizer::default(),
        IdentityOptions {
            lookup_timeout: TEST_LOOKUP_TIMEOUT,
            ..Default::default()
        },
    ));
    (build(sources, cache.clone(), identity), cache)
}

fn build(
    sources: Vec<Arc<MockSource>>,
    cache: Arc<TtlCache>,
    identity: Arc<IdentityCache>,
) -> SourceOrchestrator {
    let options = OrchestratorOptions {
        source_timeout: TEST_SOURCE_TIMEOUT,
        ..Default::default()
    };
    SourceOrchestrator::new(registry_of(sources), cache, identity, options)
}

/// A "Frieren" record offered by each source, with `episodes` numbered
/// episodes listed per source at `https://<source>/frieren/ep-N`.
pub fn record_listing(sources: &[&str], episodes: usize) -> CanonicalRecord {
    let mut candidates = sources.iter().map(|source| {
        Candidate::new(*source, "Frieren", format!("https://{}/frieren", source))
    });
    let first = candidates.next().expect("At least one source");
    let mut record = CanonicalRecord::new(first);
    for candidate in candidates {
        record.absorb(candidate);
    }

    for source in sources {
        let locators = (1..=episodes)
            .map(|n| format!("https://{}/frieren/ep-{}", source, n))
            .collect();
        record
            .episodes
            .insert(SourceId::from(*source), EpisodeSet::numbered(locators));
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_listing_shape() {
        let record = record_listing(&["alpha", "beta"], 3);
        assert_eq!(record.candidates.len(), 2);
        assert_eq!(record.episodes.len(), 2);
        assert_eq!(
            record.episodes[&SourceId::from("beta")].get(2).unwrap().locator,
            "https://beta/frieren/ep-3"
        );
    }

    #[test]
    fn test_temp_cache_creates_directory() {
        let (_cache, dir) = temp_cache();
        assert!(dir.path().exists());
    }
}
