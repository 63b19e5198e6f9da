//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\anisource\config.toml
//! - macOS: ~/Library/Application Support/anisource/config.toml
//! - Linux: ~/.config/anisource/config.toml
//!
//! Every field has a default, so a partial file (or none at all) is fine.
//! [`Config::validate`] runs once at startup; a config that fails it is the
//! only fatal error the engine has.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheOptions, NamespaceTtls, Storage};
use crate::identity::{DEFAULT_LOOKUP_TIMEOUT, DEFAULT_MIN_CONFIDENCE, IdentityOptions, anilist};
use crate::merge::{
    DEFAULT_MERGE_THRESHOLD, DEFAULT_SYNONYMS, MergePolicy, Normalizer, SynonymError, SynonymTable,
};
use crate::orchestrator::{DEFAULT_MAX_WORKERS, OrchestratorOptions};

const DAY_SECS: u64 = 24 * 60 * 60;

/// Longest TTL allowed for the search and episode namespaces.
pub const MAX_LISTING_TTL_DAYS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Title normalization and merging
    pub merge: MergeConfig,

    /// Search fan-out
    pub search: SearchConfig,

    /// Stream resolution
    pub resolve: ResolveConfig,

    /// Persistent cache
    pub cache: CacheConfig,

    /// External id lookup
    pub identity: IdentityConfig,
}

/// Merge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Similarity threshold (0-100) at or above which titles merge
    pub threshold: u8,

    /// Merge titles whose season/part numbers differ
    pub season_insensitive: bool,

    /// Word -> replacement folded during normalization
    pub synonyms: BTreeMap<String, String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MERGE_THRESHOLD,
            season_insensitive: false,
            synonyms: DEFAULT_SYNONYMS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Per-source timeout for search and episode listing
    pub source_timeout_secs: u64,

    /// Upper bound on concurrent source calls
    pub max_workers: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: 15,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

/// Resolve settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Per-source timeout for a resolve attempt
    pub timeout_secs: u64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (empty = OS cache dir)
    pub dir: Option<PathBuf>,

    /// Number of SQLite shards
    pub shards: usize,

    pub search_ttl_days: u64,
    pub episodes_ttl_days: u64,
    pub identity_ttl_days: u64,

    /// TTL of "no match" identity answers; 0 disables negative caching
    pub negative_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            shards: crate::cache::DEFAULT_SHARDS,
            search_ttl_days: 7,
            episodes_ttl_days: 7,
            identity_ttl_days: 30,
            negative_ttl_secs: 60 * 60,
        }
    }
}

/// Identity lookup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Query the metadata service at all
    pub enabled: bool,

    /// Minimum match confidence (0.0 - 1.0)
    pub min_confidence: f32,

    /// GraphQL endpoint
    pub endpoint: String,

    /// Give up on a lookup after this long; the title then stays unresolved
    pub timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            endpoint: anilist::DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_LOOKUP_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Check every setting; the first problem found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.merge.threshold > 100 {
            return Err(invalid("merge.threshold", "must be between 0 and 100"));
        }
        self.synonym_table()?;

        if self.search.source_timeout_secs == 0 {
            return Err(invalid("search.source_timeout_secs", "must be greater than 0"));
        }
        if self.search.max_workers == 0 {
            return Err(invalid("search.max_workers", "must be at least 1"));
        }
        if self.resolve.timeout_secs == 0 {
            return Err(invalid("resolve.timeout_secs", "must be greater than 0"));
        }

        if self.cache.shards == 0 {
            return Err(invalid("cache.shards", "must be at least 1"));
        }
        for (field, days) in [
            ("cache.search_ttl_days", self.cache.search_ttl_days),
            ("cache.episodes_ttl_days", self.cache.episodes_ttl_days),
        ] {
            if !(1..=MAX_LISTING_TTL_DAYS).contains(&days) {
                return Err(invalid(field, "must be between 1 and 30 days"));
            }
        }
        if self.cache.identity_ttl_days == 0 {
            return Err(invalid("cache.identity_ttl_days", "must be at least 1 day"));
        }

        if !(0.0..=1.0).contains(&self.identity.min_confidence) {
            return Err(invalid("identity.min_confidence", "must be between 0.0 and 1.0"));
        }
        if self.identity.timeout_secs == 0 {
            return Err(invalid("identity.timeout_secs", "must be greater than 0"));
        }
        if self.identity.enabled && self.identity.endpoint.trim().is_empty() {
            return Err(invalid("identity.endpoint", "must not be empty"));
        }

        Ok(())
    }

    pub fn synonym_table(&self) -> Result<SynonymTable, ConfigError> {
        Ok(SynonymTable::new(
            self.merge
                .synonyms
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )?)
    }

    pub fn normalizer(&self) -> Result<Normalizer, ConfigError> {
        Ok(Normalizer::new(self.synonym_table()?))
    }

    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy {
            threshold: self.merge.threshold.min(100),
            season_insensitive: self.merge.season_insensitive,
        }
    }

    pub fn orchestrator_options(&self) -> Result<OrchestratorOptions, ConfigError> {
        Ok(OrchestratorOptions {
            normalizer: self.normalizer()?,
            policy: self.merge_policy(),
            source_timeout: Duration::from_secs(self.search.source_timeout_secs),
            max_workers: self.search.max_workers,
        })
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve.timeout_secs)
    }

    pub fn cache_options(&self) -> CacheOptions {
        let storage = match &self.cache.dir {
            Some(dir) => Storage::Directory(dir.clone()),
            None => Storage::default_location(),
        };
        CacheOptions {
            storage,
            shards: self.cache.shards,
            ttls: NamespaceTtls {
                search: days(self.cache.search_ttl_days),
                episodes: days(self.cache.episodes_ttl_days),
                identity: days(self.cache.identity_ttl_days),
            },
        }
    }

    pub fn identity_options(&self) -> IdentityOptions {
        IdentityOptions {
            min_confidence: self.identity.min_confidence,
            negative_ttl: Duration::from_secs(self.cache.negative_ttl_secs),
            lookup_timeout: Duration::from_secs(self.identity.timeout_secs),
        }
    }
}

fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(DAY_SECS))
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("anisource"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load and parse a specific config file, reporting any problem.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid synonym table: {0}")]
    Synonyms(#[from] SynonymError),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
