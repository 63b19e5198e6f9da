//! Adapter for plugins that do synchronous, blocking I/O.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Source, SourceError};
use crate::model::{Candidate, EpisodeSet, ExtraParams, PlayableResource, SourceId};

/// Blocking flavour of [`Source`], for scrapers built on synchronous clients.
pub trait BlockingSource: Send + Sync + 'static {
    fn id(&self) -> SourceId;

    fn search(&self, query: &str) -> Result<Vec<Candidate>, SourceError>;

    fn list_episodes(
        &self,
        locator: &str,
        extra_params: &ExtraParams,
    ) -> Result<EpisodeSet, SourceError>;

    fn resolve(&self, episode_locator: &str) -> Result<Option<PlayableResource>, SourceError>;
}

/// Runs a [`BlockingSource`] on tokio's blocking pool.
///
/// A panic inside the plugin surfaces as [`SourceError::Task`] instead of
/// tearing down the caller.
pub struct Blocking<T> {
    inner: Arc<T>,
}

impl<T: BlockingSource> Blocking<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    async fn run<R, F>(&self, call: F) -> Result<R, SourceError>
    where
        R: Send + 'static,
        F: FnOnce(&T) -> Result<R, SourceError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || call(&inner))
            .await
            .map_err(|e| SourceError::Task(e.to_string()))?
    }
}

#[async_trait]
impl<T: BlockingSource> Source for Blocking<T> {
    fn id(&self) -> SourceId {
        self.inner.id()
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>, SourceError> {
        let query = query.to_string();
        self.run(move |source| source.search(&query)).await
    }

    async fn list_episodes(
        &self,
        locator: &str,
        extra_params: &ExtraParams,
    ) -> Result<EpisodeSet, SourceError> {
        let locator = locator.to_string();
        let extra_params = extra_params.clone();
        self.run(move |source| source.list_episodes(&locator, &extra_params))
            .await
    }

    async fn resolve(&self, episode_locator: &str) -> Result<Option<PlayableResource>, SourceError> {
        let episode_locator = episode_locator.to_string();
        self.run(move |source| source.resolve(&episode_locator)).await
    }
}
