//! Sharded, namespaced TTL cache persisted in SQLite.
//!
//! Search results, episode lists and identity bindings are cached here so
//! repeated lookups skip slow remote sites. Entries expire lazily: an expired
//! row reads as a miss and is deleted on the way out; [`TtlCache::purge_expired`]
//! reclaims the rest.
//!
//! # Sharding
//!
//! Storage is split into independent SQLite databases (`shard-0.db`,
//! `shard-1.db`, ...), each with its own connection, so concurrent fan-out
//! tasks don't queue behind a single lock. The shard of a `(namespace, key)`
//! pair is derived from SHA-256, which keeps the mapping stable across
//! restarts and toolchain upgrades.
//!
//! # Failure model
//!
//! The cache never fails a caller. A shard that cannot be opened or read is
//! logged and treated as empty; undecodable values read as misses.
//!
//! There is deliberately no namespace for playable stream locators: they
//! embed short-lived tokens and must never be served from cache.

mod clock;
mod shard;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

pub use clock::{Clock, ManualClock, SystemClock};
use clock::duration_millis;
use shard::{Shard, ShardLocation};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 4;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Canonical records per query
    Search,
    /// Episode lists per (item, source)
    Episodes,
    /// Title -> external id bindings
    Identity,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Search, Namespace::Episodes, Namespace::Identity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Search => "search",
            Namespace::Episodes => "episodes",
            Namespace::Identity => "identity",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Namespace::Search),
            "episodes" => Ok(Namespace::Episodes),
            "identity" => Ok(Namespace::Identity),
            other => Err(CacheError::UnknownNamespace(other.to_string())),
        }
    }
}

/// Cache errors. Only surfaced by diagnostics; the public read/write API
/// degrades instead of returning them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache shard {0} is unavailable")]
    Unavailable(usize),

    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode cache value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Unknown cache namespace: {0}")]
    UnknownNamespace(String),
}

/// Default time-to-live per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceTtls {
    pub search: Duration,
    pub episodes: Duration,
    pub identity: Duration,
}

impl Default for NamespaceTtls {
    fn default() -> Self {
        Self {
            search: 7 * DAY,
            episodes: 7 * DAY,
            identity: 30 * DAY,
        }
    }
}

impl NamespaceTtls {
    pub fn get(&self, namespace: Namespace) -> Duration {
        match namespace {
            Namespace::Search => self.search,
            Namespace::Episodes => self.episodes,
            Namespace::Identity => self.identity,
        }
    }
}

/// Where the cache keeps its shards.
#[derive(Debug, Clone)]
pub enum Storage {
    /// One SQLite file per shard inside this directory
    Directory(PathBuf),
    /// Process-local in-memory databases
    Memory,
}

impl Storage {
    /// `<user cache dir>/anisource`, falling back to `.cache/anisource`.
    pub fn default_location() -> Self {
        let dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("anisource");
        Storage::Directory(dir)
    }
}

/// Cache construction options.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub storage: Storage,
    pub shards: usize,
    pub ttls: NamespaceTtls,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            storage: Storage::default_location(),
            shards: DEFAULT_SHARDS,
            ttls: NamespaceTtls::default(),
        }
    }
}

impl CacheOptions {
    pub fn in_memory() -> Self {
        Self {
            storage: Storage::Memory,
            ..Default::default()
        }
    }

    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: Storage::Directory(dir.into()),
            ..Default::default()
        }
    }
}

/// Per-shard statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardStats {
    pub shard: usize,
    pub available: bool,
    /// (namespace, entries) pairs
    pub entries: Vec<(String, u64)>,
}

impl ShardStats {
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, n)| n).sum()
    }
}

/// Shard for a `(namespace, key)` pair: SHA-256 of `namespace \0 key`, first
/// eight bytes big-endian, modulo the shard count.
pub fn shard_for(namespace: Namespace, key: &str, shards: usize) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let shards = shards.max(1) as u64;
    (u64::from_be_bytes(prefix) % shards) as usize
}

/// The sharded TTL cache.
///
/// Cheap to construct: nothing is opened until the first read or write
/// touches a shard.
pub struct TtlCache {
    shards: Vec<Shard>,
    ttls: NamespaceTtls,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(options: CacheOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Construct with a custom clock (used by tests to fake time).
    pub fn with_clock(options: CacheOptions, clock: Arc<dyn Clock>) -> Self {
        let count = options.shards.max(1);

        if let Storage::Directory(ref dir) = options.storage
            && let Err(e) = std::fs::create_dir_all(dir)
        {
            // Each shard will fail to open and degrade on its own.
            tracing::warn!("Failed to create cache directory {:?}: {}", dir, e);
        }

        let shards = (0..count)
            .map(|index| {
                let location = match &options.storage {
                    Storage::Directory(dir) => {
                        ShardLocation::File(dir.join(format!("shard-{}.db", index)))
                    }
                    Storage::Memory => ShardLocation::Memory,
                };
                Shard::new(index, location)
            })
            .collect();

        Self {
            shards,
            ttls: options.ttls,
            clock,
        }
    }

    /// In-memory cache with default settings.
    pub fn in_memory() -> Self {
        Self::new(CacheOptions::in_memory())
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Configured TTL of a namespace.
    pub fn ttl(&self, namespace: Namespace) -> Duration {
        self.ttls.get(namespace)
    }

    fn shard(&self, namespace: Namespace, key: &str) -> &Shard {
        &self.shards[shard_for(namespace, key, self.shards.len())]
    }

    /// Read a live entry. Expired, missing, unreadable and undecodable
    /// entries are all misses.
    pub async fn get<T: DeserializeOwned>(&self, namespace: Namespace, key: &str) -> Option<T> {
        let shard = self.shard(namespace, key);
        let row = match shard.fetch(namespace, key).await {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(CacheError::Unavailable(_)) => return None,
            Err(e) => {
                tracing::warn!(shard = shard.index(), "Cache read failed: {}", e);
                return None;
            }
        };

        let now = self.clock.now_millis();
        if row.expires_at <= now {
            tracing::debug!(%namespace, key, "Cache entry expired");
            if let Err(e) = shard.remove_expired(namespace, key, now).await {
                tracing::debug!("Failed to drop expired entry: {}", e);
            }
            return None;
        }

        match serde_json::from_str(&row.value) {
            Ok(value) => {
                tracing::debug!(%namespace, key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(%namespace, key, "Discarding undecodable cache entry: {}", e);
                None
            }
        }
    }

    /// Store a value for `ttl`. Returns whether it was written.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(%namespace, key, "Failed to encode cache value: {}", e);
                return false;
            }
        };
        let expires_at = self.clock.now_millis().saturating_add(duration_millis(ttl));

        let shard = self.shard(namespace, key);
        match shard.store(namespace, key, &encoded, expires_at).await {
            Ok(()) => true,
            Err(CacheError::Unavailable(_)) => false,
            Err(e) => {
                tracing::warn!(shard = shard.index(), "Cache write failed: {}", e);
                false
            }
        }
    }

    /// Store a value with the namespace's configured TTL.
    pub async fn set_default<T: Serialize + ?Sized>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
    ) -> bool {
        self.set(namespace, key, value, self.ttl(namespace)).await
    }

    /// Remove every entry of `namespace` whose key starts with `prefix`.
    /// An empty prefix clears the namespace. Returns the number removed.
    pub async fn invalidate(&self, namespace: Namespace, prefix: &str) -> u64 {
        let mut removed = 0;
        for shard in &self.shards {
            match shard.remove_prefix(namespace, prefix).await {
                Ok(n) => removed += n,
                Err(CacheError::Unavailable(_)) => {}
                Err(e) => tracing::warn!(shard = shard.index(), "Cache invalidate failed: {}", e),
            }
        }
        tracing::debug!(%namespace, prefix, removed, "Invalidated cache entries");
        removed
    }

    /// Delete all expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> u64 {
        let now = self.clock.now_millis();
        let mut removed = 0;
        for shard in &self.shards {
            match shard.purge_expired(now).await {
                Ok(n) => removed += n,
                Err(CacheError::Unavailable(_)) => {}
                Err(e) => tracing::warn!(shard = shard.index(), "Cache purge failed: {}", e),
            }
        }
        removed
    }

    /// Entry counts and availability of every shard.
    pub async fn stats(&self) -> Vec<ShardStats> {
        let mut stats = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let entry = match shard.counts().await {
                Ok(counts) => ShardStats {
                    shard: shard.index(),
                    available: true,
                    entries: counts
                        .into_iter()
                        .map(|(ns, n)| (ns, u64::try_from(n).unwrap_or(0)))
                        .collect(),
                },
                Err(e) => {
                    if !matches!(e, CacheError::Unavailable(_)) {
                        tracing::warn!(shard = shard.index(), "Cache stats failed: {}", e);
                    }
                    ShardStats {
                        shard: shard.index(),
                        available: false,
                        entries: vec![],
                    }
                }
            };
            stats.push(entry);
        }
        stats
    }
}

impl fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("shards", &self.shards.len())
            .field("ttls", &self.ttls)
            .finish()
    }
}
