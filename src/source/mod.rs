//! Source plugin contract and registry.
//!
//! Every site the engine can search implements [`Source`]. Plugins are
//! registered explicitly at startup in a [`SourceRegistry`]; nothing is
//! discovered implicitly.
//!
//! Plugins that do blocking I/O implement [`BlockingSource`] instead and are
//! wrapped with [`Blocking`], which moves each call onto tokio's blocking
//! pool.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = SourceRegistry::new();
//! registry.register(Arc::new(MySite::new()))?;
//! registry.register(Arc::new(Blocking::new(MyScraper::new())))?;
//! ```

mod blocking;
#[cfg(test)]
pub mod mocks;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{Candidate, EpisodeSet, ExtraParams, MalformedEpisodeData, PlayableResource, SourceId};

pub use blocking::{Blocking, BlockingSource};

/// Maximum length of a failure message kept for diagnostics.
pub const MAX_DIAGNOSTIC_LEN: usize = 200;

/// Errors a source plugin can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error(transparent)]
    MalformedEpisodes(#[from] MalformedEpisodeData),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Source task failed: {0}")]
    Task(String),

    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// Error message cut to [`MAX_DIAGNOSTIC_LEN`] characters.
    pub fn diagnostic(&self) -> String {
        truncate(&self.to_string(), MAX_DIAGNOSTIC_LEN)
    }
}

/// Truncate on a character boundary, appending an ellipsis when cut.
pub fn truncate(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

/// Run one plugin call on its own task, bounded by `timeout`.
///
/// Panics surface as [`SourceError::Task`] and a timed-out call is aborted,
/// so one misbehaving plugin never takes its siblings down with it.
pub(crate) async fn guarded<T, F>(timeout: Duration, call: F) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SourceError>> + Send + 'static,
{
    let mut handle = tokio::spawn(call);
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(SourceError::Task(e.to_string())),
        Err(_) => {
            handle.abort();
            Err(SourceError::Timeout(timeout))
        }
    }
}

/// Capability contract implemented once per source site.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier, unique within a registry.
    fn id(&self) -> SourceId;

    /// Search the site. An empty list is a valid answer.
    async fn search(&self, query: &str) -> Result<Vec<Candidate>, SourceError>;

    /// List the episodes behind a candidate locator.
    async fn list_episodes(
        &self,
        locator: &str,
        extra_params: &ExtraParams,
    ) -> Result<EpisodeSet, SourceError>;

    /// Resolve an episode locator to a playable stream.
    ///
    /// `Ok(None)` means the site answered but has nothing playable;
    /// `Err` means the attempt itself failed.
    async fn resolve(&self, episode_locator: &str) -> Result<Option<PlayableResource>, SourceError>;
}

/// Registry error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Source {0} is already registered")]
pub struct DuplicateSource(pub SourceId);

/// Explicit, ordered collection of source plugins.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin; ids must be unique.
    pub fn register(&mut self, source: Arc<dyn Source>) -> Result<(), DuplicateSource> {
        let id = source.id();
        if self.get(&id).is_some() {
            return Err(DuplicateSource(id));
        }
        tracing::debug!(source = %id, "Registered source");
        self.sources.push(source);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, source: Arc<dyn Source>) -> Result<Self, DuplicateSource> {
        self.register(source)?;
        Ok(self)
    }

    pub fn get(&self, id: &SourceId) -> Option<Arc<dyn Source>> {
        self.sources.iter().find(|s| &s.id() == id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    pub fn ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
