//! Source orchestrator: concurrent fan-out search and episode listing.
//!
//! A search asks every registered source at once, merges candidates into the
//! canonical index as each source answers, and streams the changes to the
//! caller. One slow, failing or panicking source never holds up or aborts
//! the others; it shows up as a [`SearchEvent::SourceFailed`] diagnostic.
//!
//! # Caching
//!
//! - `search` namespace: the full record list of a query, keyed by the
//!   query's external id when the identity cache resolves one and by its
//!   normalized form otherwise. Only written when every source answered.
//! - `episodes` namespace: one entry per `(item, source)` pair.
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = SourceOrchestrator::new(registry, cache, identity, Default::default());
//! let mut events = std::pin::pin!(orchestrator.search("frieren"));
//! while let Some(event) = events.next().await {
//!     // render incrementally
//! }
//! ```

mod events;

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::cache::{Namespace, TtlCache};
use crate::identity::IdentityCache;
use crate::merge::{CanonicalIndex, MergeOutcome, MergePolicy, Normalizer};
use crate::model::{Candidate, CanonicalRecord, EpisodeSet, ExternalId, SourceId};
use crate::source::{MAX_DIAGNOSTIC_LEN, Source, SourceError, SourceRegistry, guarded, truncate};

pub use events::{EpisodeListing, SearchEvent, SearchOutcome, SearchSummary, SourceFailure};

/// Default per-source timeout for search and episode listing.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default upper bound on concurrent source calls.
pub const DEFAULT_MAX_WORKERS: usize = 8;

const EVENT_BUFFER: usize = 64;

/// Errors from single-source operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Source {0} is not registered")]
    UnknownSource(SourceId),

    #[error("Record has no candidate from source {0}")]
    NotOffered(SourceId),

    #[error("Source {source_id} failed: {error}")]
    Source {
        source_id: SourceId,
        #[source]
        error: SourceError,
    },
}

impl OrchestratorError {
    /// Error message cut for display.
    pub fn diagnostic(&self) -> String {
        truncate(&self.to_string(), MAX_DIAGNOSTIC_LEN)
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub normalizer: Normalizer,
    pub policy: MergePolicy,
    /// Bound on each search or episode-listing call
    pub source_timeout: Duration,
    /// Upper bound on concurrent source calls
    pub max_workers: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            normalizer: Normalizer::default(),
            policy: MergePolicy::default(),
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

/// The canonical index plus the search it belongs to.
struct WorkingSet {
    generation: u64,
    index: CanonicalIndex,
}

/// A newer search replaced the working set mid-flight.
struct Superseded;

struct Inner {
    registry: SourceRegistry,
    cache: Arc<TtlCache>,
    identity: Arc<IdentityCache>,
    options: OrchestratorOptions,
    working: Mutex<WorkingSet>,
}

/// Fans searches out to every registered source and owns the working set.
///
/// Cheap to clone; clones share the same working set.
#[derive(Clone)]
pub struct SourceOrchestrator {
    inner: Arc<Inner>,
}

impl SourceOrchestrator {
    pub fn new(
        registry: SourceRegistry,
        cache: Arc<TtlCache>,
        identity: Arc<IdentityCache>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                cache,
                identity,
                options,
                working: Mutex::new(WorkingSet {
                    generation: 0,
                    index: CanonicalIndex::new(),
                }),
            }),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.inner.registry
    }

    /// Start a search and stream its progress.
    ///
    /// The working set is reset immediately. Events from a search that is
    /// superseded by a newer one stop early. Must be called from within a
    /// tokio runtime.
    pub fn search(&self, query: &str) -> impl Stream<Item = SearchEvent> + Send + 'static {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let generation = self.inner.begin_generation();
        let inner = Arc::clone(&self.inner);
        let query = query.to_string();

        tokio::spawn(async move {
            inner.run_search(generation, query, tx).await;
        });

        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }

    /// Run a search to completion.
    pub async fn search_collect(&self, query: &str) -> SearchOutcome {
        let mut events = pin!(self.search(query));
        let mut records = BTreeMap::new();
        let mut outcome = SearchOutcome::default();

        while let Some(event) = events.next().await {
            match event {
                SearchEvent::Record { index, record, .. } => {
                    records.insert(index, record);
                }
                SearchEvent::SourceFailed(failure) => outcome.failures.push(failure),
                SearchEvent::Finished(summary) => outcome.from_cache = summary.from_cache,
            }
        }

        outcome.records = records.into_values().collect();
        outcome
    }

    /// List one source's episodes for a record, through the episode cache.
    ///
    /// The set is attached to the record in the working set.
    pub async fn list_episodes(
        &self,
        record: &CanonicalRecord,
        source_id: &SourceId,
    ) -> Result<EpisodeSet, OrchestratorError> {
        let external_id = self.inner.identify(record).await;
        let item_key = self.inner.item_key(record, external_id.as_ref());
        self.inner.list_episodes_keyed(record, source_id, &item_key).await
    }

    /// List episodes from every source on a record concurrently.
    pub async fn load_episodes(&self, record: &CanonicalRecord) -> EpisodeListing {
        let external_id = self.inner.identify(record).await;
        let item_key = self.inner.item_key(record, external_id.as_ref());

        let sources = record.sources();
        let results = futures::future::join_all(
            sources
                .iter()
                .map(|source_id| self.inner.list_episodes_keyed(record, source_id, &item_key)),
        )
        .await;

        let mut listed = record.clone();
        if listed.external_id.is_none() {
            listed.external_id = external_id;
        }

        let mut failures = Vec::new();
        for (source_id, result) in sources.into_iter().zip(results) {
            match result {
                Ok(set) => {
                    listed.episodes.insert(source_id, set);
                }
                Err(e) => failures.push(SourceFailure {
                    source_id,
                    reason: e.diagnostic(),
                }),
            }
        }

        EpisodeListing {
            record: listed,
            failures,
        }
    }

    /// Snapshot of the working set in creation order.
    pub fn records(&self) -> Vec<CanonicalRecord> {
        self.inner.working.lock().index.records()
    }

    /// Clear the working set. Any running search stops merging.
    pub fn reset(&self) {
        self.inner.begin_generation();
    }
}

impl Inner {
    fn begin_generation(&self) -> u64 {
        let mut working = self.working.lock();
        working.generation += 1;
        working.index.clear();
        working.generation
    }

    async fn run_search(&self, generation: u64, query: String, tx: mpsc::Sender<SearchEvent>) {
        let cache_key = self.search_key(&query).await;

        if let Some(key) = &cache_key
            && let Some(records) = self
                .cache
                .get::<Vec<CanonicalRecord>>(Namespace::Search, key)
                .await
        {
            tracing::debug!(query = %query, key = %key, "Search served from cache");
            let mut count = 0;
            for record in records {
                match self.absorb_cached(generation, record) {
                    Ok(Some(event)) => {
                        count += 1;
                        emit(&tx, event).await;
                    }
                    Ok(None) => {}
                    Err(Superseded) => return,
                }
            }
            let summary = SearchSummary {
                records: count,
                failed_sources: 0,
                from_cache: true,
            };
            emit(&tx, SearchEvent::Finished(summary)).await;
            return;
        }

        let sources: Vec<Arc<dyn Source>> = self.registry.iter().cloned().collect();
        let workers = worker_count(sources.len(), self.options.max_workers);
        let timeout = self.options.source_timeout;
        tracing::debug!(query = %query, sources = sources.len(), workers, "Fanning out search");

        let calls: Vec<_> = sources
            .into_iter()
            .map(|source| search_one(source, query.clone(), timeout))
            .collect();
        let mut answers = stream::iter(calls).buffer_unordered(workers);

        let mut failures: Vec<SourceFailure> = Vec::new();
        while let Some((source_id, result)) = answers.next().await {
            let candidates = match result {
                Ok(candidates) => candidates,
                Err(e) => {
                    let reason = e.diagnostic();
                    tracing::warn!(source = %source_id, "Search failed: {}", reason);
                    let failure = SourceFailure { source_id, reason };
                    failures.push(failure.clone());
                    emit(&tx, SearchEvent::SourceFailed(failure)).await;
                    continue;
                }
            };

            tracing::debug!(source = %source_id, candidates = candidates.len(), "Source answered");
            for candidate in candidates {
                if candidate.source_id != source_id {
                    tracing::warn!(
                        source = %source_id,
                        claimed = %candidate.source_id,
                        "Dropping candidate attributed to another source"
                    );
                    continue;
                }
                match self.merge_candidate(generation, candidate) {
                    Ok(Some(event)) => emit(&tx, event).await,
                    Ok(None) => {}
                    Err(Superseded) => {
                        tracing::debug!(query = %query, "Search superseded");
                        return;
                    }
                }
            }
        }

        let records = {
            let working = self.working.lock();
            if working.generation != generation {
                return;
            }
            working.index.records()
        };

        if let Some(key) = &cache_key
            && failures.is_empty()
            && !records.is_empty()
        {
            self.cache.set_default(Namespace::Search, key, &records).await;
        } else if !failures.is_empty() {
            tracing::debug!(query = %query, "Partial search result not cached");
        }

        tracing::info!(
            query = %query,
            records = records.len(),
            failed_sources = failures.len(),
            "Search finished"
        );
        let summary = SearchSummary {
            records: records.len(),
            failed_sources: failures.len(),
            from_cache: false,
        };
        emit(&tx, SearchEvent::Finished(summary)).await;
    }

    /// Merge one candidate under the working-set lock.
    fn merge_candidate(
        &self,
        generation: u64,
        candidate: Candidate,
    ) -> Result<Option<SearchEvent>, Superseded> {
        let mut working = self.working.lock();
        if working.generation != generation {
            return Err(Superseded);
        }

        let title = candidate.display_title.clone();
        let outcome =
            working
                .index
                .merge_or_insert(candidate, &self.options.normalizer, &self.options.policy);

        let (index, created) = match outcome {
            MergeOutcome::Created(index) => {
                tracing::debug!(title = %title, index, "New record");
                (index, true)
            }
            MergeOutcome::Merged { index, score } => {
                tracing::debug!(title = %title, index, score, "Merged candidate");
                (index, false)
            }
            MergeOutcome::Duplicate(_) => return Ok(None),
        };

        Ok(working.index.get(index).cloned().map(|record| SearchEvent::Record {
            index,
            record,
            created,
        }))
    }

    /// Load a cached record into the working set.
    fn absorb_cached(
        &self,
        generation: u64,
        record: CanonicalRecord,
    ) -> Result<Option<SearchEvent>, Superseded> {
        let mut working = self.working.lock();
        if working.generation != generation {
            return Err(Superseded);
        }

        let before = working.index.len();
        let Some(index) =
            working
                .index
                .absorb_record(record, &self.options.normalizer, &self.options.policy)
        else {
            return Ok(None);
        };

        Ok(working.index.get(index).cloned().map(|record| SearchEvent::Record {
            index,
            record,
            created: index >= before,
        }))
    }

    /// Search cache key: external id of the query, else its normalized form.
    async fn search_key(&self, query: &str) -> Option<String> {
        if let Some(external_id) = self.identity.resolve_external_id(query).await {
            return Some(external_id.to_string());
        }
        let key = self.options.normalizer.normalize(query);
        (!key.is_empty()).then(|| key.as_str().to_string())
    }

    /// External id of a record, resolving and recording it if missing.
    async fn identify(&self, record: &CanonicalRecord) -> Option<ExternalId> {
        if let Some(external_id) = &record.external_id {
            return Some(external_id.clone());
        }

        let external_id = self
            .identity
            .resolve_external_id(&record.canonical_title)
            .await?;

        let mut working = self.working.lock();
        if let Some(index) = working.index.position_of(record) {
            working.index.set_external_id(index, external_id.clone());
        }
        Some(external_id)
    }

    fn item_key(&self, record: &CanonicalRecord, external_id: Option<&ExternalId>) -> String {
        if let Some(external_id) = external_id {
            return external_id.to_string();
        }
        let key = self.options.normalizer.normalize(&record.canonical_title);
        if key.is_empty() {
            record.canonical_title.clone()
        } else {
            key.as_str().to_string()
        }
    }

    async fn list_episodes_keyed(
        &self,
        record: &CanonicalRecord,
        source_id: &SourceId,
        item_key: &str,
    ) -> Result<EpisodeSet, OrchestratorError> {
        let candidate = record
            .candidate_for(source_id)
            .ok_or_else(|| OrchestratorError::NotOffered(source_id.clone()))?;
        let source = self
            .registry
            .get(source_id)
            .ok_or_else(|| OrchestratorError::UnknownSource(source_id.clone()))?;

        let cache_key = format!("{}|{}", item_key, source_id);
        if let Some(set) = self
            .cache
            .get::<EpisodeSet>(Namespace::Episodes, &cache_key)
            .await
        {
            self.attach_episodes(record, source_id, set.clone());
            return Ok(set);
        }

        let locator = candidate.locator.clone();
        let extra_params = candidate.extra_params.clone();
        let result = guarded(self.options.source_timeout, async move {
            source.list_episodes(&locator, &extra_params).await
        })
        .await;

        match result {
            Ok(set) => {
                tracing::debug!(source = %source_id, episodes = set.len(), "Listed episodes");
                self.cache
                    .set_default(Namespace::Episodes, &cache_key, &set)
                    .await;
                self.attach_episodes(record, source_id, set.clone());
                Ok(set)
            }
            Err(error) => {
                tracing::warn!(source = %source_id, "Episode listing failed: {}", error.diagnostic());
                Err(OrchestratorError::Source {
                    source_id: source_id.clone(),
                    error,
                })
            }
        }
    }

    fn attach_episodes(&self, record: &CanonicalRecord, source_id: &SourceId, set: EpisodeSet) {
        let mut working = self.working.lock();
        if let Some(index) = working.index.position_of(record) {
            working.index.set_episodes(index, source_id.clone(), set);
        }
    }
}

/// Send an event, ignoring a consumer that stopped listening.
///
/// The search keeps running so the working set and cache still complete.
async fn emit(tx: &mpsc::Sender<SearchEvent>, event: SearchEvent) {
    let _ = tx.send(event).await;
}

/// One guarded search call, boxed so a fan-out can be built up front.
fn search_one(
    source: Arc<dyn Source>,
    query: String,
    timeout: Duration,
) -> BoxFuture<'static, (SourceId, Result<Vec<Candidate>, SourceError>)> {
    Box::pin(async move {
        let source_id = source.id();
        let result = guarded(timeout, async move { source.search(&query).await }).await;
        (source_id, result)
    })
}

/// Concurrency for a fan-out:`min(sources, cores, max_workers)`, at least 1.
fn worker_count(sources: usize, max_workers: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    sources.min(cores).min(max_workers).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::mocks::MockMetadata;
    use crate::model::MalformedEpisodeData;
    use crate::source::mocks::MockSource;
    use crate::test_utils::{test_orchestrator, test_orchestrator_with_identity};
    use std::time::Instant;

    fn titles(outcome: &SearchOutcome) -> Vec<String> {
        let mut titles: Vec<String> = outcome
            .records
            .iter()
            .map(|r| r.canonical_title.clone())
            .collect();
        titles.sort();
        titles
    }

    #[tokio::test]
    async fn test_near_duplicates_merge_across_sources() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Dan Da Dan"]));
        let beta = Arc::new(MockSource::new("beta").with_titles(&["Dandadan"]));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha, beta]);

        let outcome = orchestrator.search_collect("dandadan").await;

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.candidates.len(), 2);
        let mut sources = record.sources();
        sources.sort();
        assert_eq!(sources, vec![SourceId::from("alpha"), SourceId::from("beta")]);
    }

    #[tokio::test]
    async fn test_final_season_stays_separate() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Attack on Titan"]));
        let beta =
            Arc::new(MockSource::new("beta").with_titles(&["Attack on Titan: Final Season"]));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha, beta]);

        let outcome = orchestrator.search_collect("attack on titan").await;

        assert_eq!(
            titles(&outcome),
            vec!["Attack on Titan", "Attack on Titan: Final Season"]
        );
    }

    #[tokio::test]
    async fn test_failing_source_leaves_union_of_others() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren", "Dandadan"]));
        let beta = Arc::new(
            MockSource::new("beta").failing(SourceError::Network("connection refused".into())),
        );
        let gamma = Arc::new(MockSource::new("gamma").with_titles(&["Dan Da Dan", "Dungeon Meshi"]));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha, beta, gamma]);

        let outcome = orchestrator.search_collect("anything").await;

        // Either spelling may name the merged record, depending on who answers first
        assert_eq!(outcome.records.len(), 3);
        let merged: Vec<_> = outcome
            .records
            .iter()
            .filter(|r| r.candidates.len() == 2)
            .collect();
        assert_eq!(merged.len(), 1);
        assert!(["Dandadan", "Dan Da Dan"].contains(&merged[0].canonical_title.as_str()));
        let mut others: Vec<_> = outcome
            .records
            .iter()
            .filter(|r| r.candidates.len() == 1)
            .map(|r| r.canonical_title.as_str())
            .collect();
        others.sort();
        assert_eq!(others, vec!["Dungeon Meshi", "Frieren"]);

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source_id, SourceId::from("beta"));
        assert!(outcome.failures[0].reason.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_panicking_source_is_isolated() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
        let beta = Arc::new(MockSource::new("beta").with_titles(&["Dungeon Meshi"]));
        let gamma = Arc::new(MockSource::new("gamma").panicking());
        let (orchestrator, _cache) = test_orchestrator(vec![alpha, beta, gamma]);

        let outcome = orchestrator.search_collect("anything").await;

        assert_eq!(titles(&outcome), vec!["Dungeon Meshi", "Frieren"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source_id, SourceId::from("gamma"));
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let slow = Arc::new(
            MockSource::new("slow")
                .with_titles(&["Frieren"])
                .with_search_delay(Duration::from_secs(5)),
        );
        let fast = Arc::new(MockSource::new("fast").with_titles(&["Dungeon Meshi"]));
        let (orchestrator, _cache) = test_orchestrator(vec![slow, fast]);

        let started = Instant::now();
        let outcome = orchestrator.search_collect("anything").await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(titles(&outcome), vec!["Dungeon Meshi"]);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].reason.contains("Timed out"));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let alpha = Arc::new(MockSource::new("alpha"));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha.clone()]);

        let outcome = orchestrator.search_collect("nothing here").await;
        assert!(outcome.is_empty());
        assert!(outcome.failures.is_empty());

        // Empty answers are not cached
        orchestrator.search_collect("nothing here").await;
        assert_eq!(alpha.calls(&alpha.search_calls), 2);
    }

    #[tokio::test]
    async fn test_repeat_search_is_served_from_cache() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
        let beta = Arc::new(MockSource::new("beta").with_titles(&["Sousou no Frieren"]));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha.clone(), beta.clone()]);

        let first = orchestrator.search_collect("Frieren").await;
        assert!(!first.from_cache);

        let second = orchestrator.search_collect("frieren!").await;
        assert!(second.from_cache);
        assert_eq!(titles(&second), titles(&first));
        assert_eq!(alpha.calls(&alpha.search_calls), 1);
        assert_eq!(beta.calls(&beta.search_calls), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_not_cached() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
        let beta = Arc::new(MockSource::new("beta").failing(SourceError::Other("503".into())));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha.clone(), beta]);

        orchestrator.search_collect("frieren").await;
        let second = orchestrator.search_collect("frieren").await;

        assert!(!second.from_cache);
        assert_eq!(alpha.calls(&alpha.search_calls), 2);
    }

    #[tokio::test]
    async fn test_search_key_prefers_external_id() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
        let metadata = Arc::new(MockMetadata::matching("anilist:154587", 0.99));
        let (orchestrator, cache) =
            test_orchestrator_with_identity(vec![alpha.clone()], metadata);

        orchestrator.search_collect("Frieren").await;
        // A different spelling resolving to the same id hits the same entry
        let second = orchestrator.search_collect("Sousou no Frieren").await;

        assert!(second.from_cache);
        assert_eq!(alpha.calls(&alpha.search_calls), 1);
        assert!(
            cache
                .get::<Vec<CanonicalRecord>>(Namespace::Search, "anilist:154587")
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_hung_metadata_service_does_not_stall_search() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
        let metadata = Arc::new(MockMetadata::hanging());
        let (orchestrator, _cache) =
            test_orchestrator_with_identity(vec![alpha.clone()], metadata);

        let outcome = tokio::time::timeout(
            Duration::from_secs(3),
            orchestrator.search_collect("frieren"),
        )
        .await
        .expect("search stalled on the metadata service");

        assert_eq!(titles(&outcome), vec!["Frieren"]);
        assert_eq!(alpha.calls(&alpha.search_calls), 1);

        let record = outcome.records[0].clone();
        let listing = tokio::time::timeout(Duration::from_secs(3), orchestrator.load_episodes(&record))
            .await
            .expect("episode listing stalled on the metadata service");
        assert!(listing.failures.is_empty());
        assert!(listing.record.external_id.is_none());
    }

    #[tokio::test]
    async fn test_events_stream_incrementally() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren", "Dandadan"]));
        let beta = Arc::new(MockSource::new("beta").with_titles(&["Dan Da Dan"]));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha, beta]);

        let events: Vec<SearchEvent> = orchestrator.search("x").collect().await;

        let created = events
            .iter()
            .filter(|e| matches!(e, SearchEvent::Record { created: true, .. }))
            .count();
        let extended = events
            .iter()
            .filter(|e| matches!(e, SearchEvent::Record { created: false, .. }))
            .count();
        assert_eq!(created, 2);
        assert_eq!(extended, 1);
        assert!(matches!(
            events.last(),
            Some(SearchEvent::Finished(SearchSummary {
                records: 2,
                failed_sources: 0,
                from_cache: false
            }))
        ));
    }

    #[tokio::test]
    async fn test_new_search_resets_working_set() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha]);

        orchestrator.search_collect("frieren").await;
        assert_eq!(orchestrator.records().len(), 1);

        orchestrator.reset();
        assert!(orchestrator.records().is_empty());

        // Served from cache, but still a fresh working set of one record
        orchestrator.search_collect("frieren").await;
        assert_eq!(orchestrator.records().len(), 1);
    }

    #[tokio::test]
    async fn test_list_episodes_caches_and_attaches() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha.clone()]);
        let outcome = orchestrator.search_collect("frieren").await;
        let record = &outcome.records[0];
        let source_id = SourceId::from("alpha");

        let first = orchestrator.list_episodes(record, &source_id).await.unwrap();
        let second = orchestrator.list_episodes(record, &source_id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(alpha.calls(&alpha.episode_calls), 1);
        assert_eq!(orchestrator.records()[0].episodes.get(&source_id), Some(&first));
    }

    #[tokio::test]
    async fn test_malformed_episodes_are_rejected_and_not_cached() {
        let malformed = SourceError::MalformedEpisodes(MalformedEpisodeData {
            locators: 3,
            labels: 2,
        });
        let alpha = Arc::new(
            MockSource::new("alpha")
                .with_titles(&["Frieren"])
                .with_episodes(Err(malformed)),
        );
        let (orchestrator, _cache) = test_orchestrator(vec![alpha.clone()]);
        let record = orchestrator.search_collect("frieren").await.records.remove(0);
        let source_id = SourceId::from("alpha");

        let err = orchestrator.list_episodes(&record, &source_id).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Source {
                error: SourceError::MalformedEpisodes(_),
                ..
            }
        ));

        assert!(orchestrator.list_episodes(&record, &source_id).await.is_err());
        assert_eq!(alpha.calls(&alpha.episode_calls), 2);
        assert!(orchestrator.records()[0].episodes.is_empty());
    }

    #[tokio::test]
    async fn test_list_episodes_for_source_not_on_record() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
        let beta = Arc::new(MockSource::new("beta"));
        let (orchestrator, _cache) = test_orchestrator(vec![alpha, beta]);
        let record = orchestrator.search_collect("frieren").await.records.remove(0);

        let err = orchestrator
            .list_episodes(&record, &SourceId::from("beta"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotOffered(_)));
    }

    #[tokio::test]
    async fn test_load_episodes_collects_failures() {
        let alpha = Arc::new(MockSource::new("alpha").with_titles(&["Frieren"]));
        let beta = Arc::new(
            MockSource::new("beta")
                .with_titles(&["Frieren"])
                .with_episodes(Err(SourceError::Parse("unexpected markup".into()))),
        );
        let (orchestrator, _cache) = test_orchestrator(vec![alpha, beta]);
        let record = orchestrator.search_collect("frieren").await.records.remove(0);
        assert_eq!(record.candidates.len(), 2);

        let listing = orchestrator.load_episodes(&record).await;

        assert_eq!(listing.record.episodes.len(), 1);
        assert!(listing.record.episodes.contains_key(&SourceId::from("alpha")));
        assert_eq!(listing.failures.len(), 1);
        assert_eq!(listing.failures[0].source_id, SourceId::from("beta"));
        assert!(listing.failures[0].reason.contains("unexpected markup"));
    }

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(0, 8), 1);
        assert_eq!(worker_count(3, 1), 1);
        assert!(worker_count(3, 8) <= 3);
    }
}
