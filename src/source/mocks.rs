//! Mock source plugin for testing.
//!
//! Returns configurable responses with optional artificial latency so tests
//! can exercise fan-out isolation and the resolve race.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{Source, SourceError};
use crate::model::{Candidate, EpisodeSet, ExtraParams, PlayableResource, SourceId};

/// What a mock does when asked to resolve.
#[derive(Debug, Clone)]
pub enum ResolveBehavior {
    /// Return this resource
    Play(PlayableResource),
    /// Answer `Ok(None)`
    Nothing,
    /// Fail with this error
    Fail(SourceError),
}

/// Mock source that returns predefined results.
pub struct MockSource {
    id: SourceId,
    /// Candidates returned from search
    pub results: Vec<Candidate>,
    /// Error returned from search (takes precedence over results)
    pub search_error: Option<SourceError>,
    /// Panic inside search instead of returning
    pub search_panics: bool,
    /// Delay before search answers
    pub search_delay: Duration,
    /// Episode listing answer; `None` lists two numbered episodes under the locator
    pub episodes: Option<Result<EpisodeSet, SourceError>>,
    /// Resolve answer
    pub resolve: ResolveBehavior,
    /// Delay before resolve answers
    pub resolve_delay: Duration,
    pub search_calls: AtomicUsize,
    pub episode_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
}

impl MockSource {
    /// A source with no results that resolves nothing.
    pub fn new(id: &str) -> Self {
        Self {
            id: SourceId::from(id),
            results: vec![],
            search_error: None,
            search_panics: false,
            search_delay: Duration::ZERO,
            episodes: None,
            resolve: ResolveBehavior::Nothing,
            resolve_delay: Duration::ZERO,
            search_calls: AtomicUsize::new(0),
            episode_calls: AtomicUsize::new(0),
            resolve_calls: AtomicUsize::new(0),
        }
    }

    /// Return one candidate per title, located at `https://<id>/<slug>`.
    pub fn with_titles(mut self, titles: &[&str]) -> Self {
        self.results = titles
            .iter()
            .map(|title| Candidate::new(self.id.clone(), *title, mock_locator(&self.id, title)))
            .collect();
        self
    }

    /// Fail every search with the given error.
    pub fn failing(mut self, error: SourceError) -> Self {
        self.search_error = Some(error);
        self
    }

    /// Panic on every search.
    pub fn panicking(mut self) -> Self {
        self.search_panics = true;
        self
    }

    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    pub fn with_episodes(mut self, episodes: Result<EpisodeSet, SourceError>) -> Self {
        self.episodes = Some(episodes);
        self
    }

    /// Resolve every episode to `locator` after `delay`.
    pub fn resolving(mut self, locator: &str, delay: Duration) -> Self {
        self.resolve = ResolveBehavior::Play(PlayableResource::new(locator));
        self.resolve_delay = delay;
        self
    }

    /// Fail every resolve after `delay`.
    pub fn failing_resolve(mut self, error: SourceError, delay: Duration) -> Self {
        self.resolve = ResolveBehavior::Fail(error);
        self.resolve_delay = delay;
        self
    }

    pub fn calls(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Locator a mock assigns to a title.
pub fn mock_locator(id: &SourceId, title: &str) -> String {
    format!("https://{}/{}", id, title.to_lowercase().replace(' ', "-"))
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> SourceId {
        self.id.clone()
    }

    async fn search(&self, _query: &str) -> Result<Vec<Candidate>, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if !self.search_delay.is_zero() {
            tokio::time::sleep(self.search_delay).await;
        }
        if self.search_panics {
            panic!("mock source {} panicked", self.id);
        }
        if let Some(ref err) = self.search_error {
            return Err(err.clone());
        }
        Ok(self.results.clone())
    }

    async fn list_episodes(
        &self,
        locator: &str,
        _extra_params: &ExtraParams,
    ) -> Result<EpisodeSet, SourceError> {
        self.episode_calls.fetch_add(1, Ordering::SeqCst);
        match &self.episodes {
            Some(answer) => answer.clone(),
            None => Ok(EpisodeSet::numbered(vec![
                format!("{}/ep-1", locator),
                format!("{}/ep-2", locator),
            ])),
        }
    }

    async fn resolve(&self, _episode_locator: &str) -> Result<Option<PlayableResource>, SourceError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if !self.resolve_delay.is_zero() {
            tokio::time::sleep(self.resolve_delay).await;
        }
        match &self.resolve {
            ResolveBehavior::Play(resource) => Ok(Some(resource.clone())),
            ResolveBehavior::Nothing => Ok(None),
            ResolveBehavior::Fail(err) => Err(err.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_search_results() {
        let mock = MockSource::new("alpha").with_titles(&["Frieren", "Dungeon Meshi"]);
        let results = mock.search("any").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].locator, "https://alpha/dungeon-meshi");
        assert_eq!(mock.calls(&mock.search_calls), 1);
    }

    #[tokio::test]
    async fn test_mock_search_error() {
        let mock = MockSource::new("alpha").failing(SourceError::Network("down".into()));
        assert!(matches!(mock.search("any").await, Err(SourceError::Network(_))));
    }

    #[tokio::test]
    async fn test_mock_default_episodes() {
        let mock = MockSource::new("alpha");
        let set = mock.list_episodes("https://alpha/x", &ExtraParams::new()).await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().locator, "https://alpha/x/ep-1");
    }

    #[tokio::test]
    async fn test_mock_resolve() {
        let mock = MockSource::new("alpha").resolving("https://cdn/a.m3u8", Duration::ZERO);
        let resource = mock.resolve("ep").await.unwrap().unwrap();
        assert_eq!(resource.locator, "https://cdn/a.m3u8");
    }
}
