//! The assembled engine: one cache, one identity cache, one orchestrator and
//! one resolver built from a [`Config`] and a set of plugins.

use std::sync::Arc;

use futures::Stream;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{Result, ResultExt};
use crate::identity::{AniListClient, IdentityCache, IdentityResolution, MetadataService};
use crate::model::{CanonicalRecord, EpisodeSet, SourceId};
use crate::orchestrator::{EpisodeListing, SearchEvent, SearchOutcome, SourceOrchestrator};
use crate::resolver::{Resolution, StreamResolver};
use crate::source::{Source, SourceRegistry};

/// Collects plugins and overrides before building an [`Engine`].
pub struct EngineBuilder {
    config: Config,
    registry: SourceRegistry,
    metadata: Option<Arc<dyn MetadataService>>,
    cache: Option<Arc<TtlCache>>,
}

impl EngineBuilder {
    /// Register a source plugin. Ids must be unique.
    pub fn source(mut self, source: Arc<dyn Source>) -> Result<Self> {
        self.registry.register(source)?;
        Ok(self)
    }

    /// Use this metadata service instead of the configured AniList endpoint.
    pub fn metadata_service(mut self, service: Arc<dyn MetadataService>) -> Self {
        self.metadata = Some(service);
        self
    }

    /// Use an existing cache instead of opening the configured one.
    pub fn cache(mut self, cache: Arc<TtlCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate the configuration and assemble the engine.
    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        config.validate()?;

        let normalizer = config.normalizer()?;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(TtlCache::new(config.cache_options())));

        let identity = if config.identity.enabled {
            let service = match self.metadata {
                Some(service) => service,
                None => Arc::new(
                    AniListClient::with_endpoint(config.identity.endpoint.clone())
                        .with_context("creating AniList client")?
                        .with_normalizer(normalizer.clone()),
                ),
            };
            IdentityCache::new(
                cache.clone(),
                service,
                normalizer,
                config.identity_options(),
            )
        } else {
            tracing::info!("Identity lookups disabled, caching by title only");
            IdentityCache::disabled(cache.clone(), normalizer)
        };
        let identity = Arc::new(identity);

        let orchestrator = SourceOrchestrator::new(
            self.registry.clone(),
            cache.clone(),
            identity.clone(),
            config.orchestrator_options()?,
        );
        let resolver = StreamResolver::new(self.registry, config.resolve_timeout());

        tracing::debug!(
            sources = ?orchestrator.registry(),
            shards = cache.shard_count(),
            "Engine ready"
        );

        Ok(Engine {
            config,
            cache,
            identity,
            orchestrator,
            resolver,
        })
    }
}

/// Entry point for embedders.
pub struct Engine {
    config: Config,
    cache: Arc<TtlCache>,
    identity: Arc<IdentityCache>,
    orchestrator: SourceOrchestrator,
    resolver: StreamResolver,
}

impl Engine {
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder {
            config,
            registry: SourceRegistry::new(),
            metadata: None,
            cache: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn orchestrator(&self) -> &SourceOrchestrator {
        &self.orchestrator
    }

    /// See [`SourceOrchestrator::search`].
    pub fn search(&self, query: &str) -> impl Stream<Item = SearchEvent> + Send + 'static {
        self.orchestrator.search(query)
    }

    /// See [`SourceOrchestrator::search_collect`].
    pub async fn search_collect(&self, query: &str) -> SearchOutcome {
        self.orchestrator.search_collect(query).await
    }

    /// See [`SourceOrchestrator::list_episodes`].
    pub async fn list_episodes(
        &self,
        record: &CanonicalRecord,
        source_id: &SourceId,
    ) -> Result<EpisodeSet> {
        Ok(self.orchestrator.list_episodes(record, source_id).await?)
    }

    /// See [`SourceOrchestrator::load_episodes`].
    pub async fn load_episodes(&self, record: &CanonicalRecord) -> EpisodeListing {
        self.orchestrator.load_episodes(record).await
    }

    /// See [`StreamResolver::resolve_playable`].
    pub async fn resolve_playable(
        &self,
        record: &CanonicalRecord,
        episode_index: usize,
    ) -> Resolution {
        self.resolver.resolve_playable(record, episode_index).await
    }

    /// Resolve a title to its external id through the identity cache.
    pub async fn identify(&self, title: &str) -> IdentityResolution {
        self.identity.resolve(title).await
    }
}
