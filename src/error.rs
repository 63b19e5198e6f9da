//! Crate-wide error types.
//!
//! This module provides a unified error hierarchy for the engine.
//! Subsystems use specific error types via `thiserror`, while the
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level error enum
//! - Subsystem errors (e.g., [`ConfigError`], [`SourceError`]) for detailed handling
//! - Per-source faults never reach this type during a search or resolve;
//!   they are reported as diagnostics instead
//!
//! # Example
//!
//! ```ignore
//! use anisource::error::{Result, ResultExt};
//!
//! fn start(config: Config) -> Result<Engine> {
//!     Engine::builder(config).build().with_context("starting engine")
//! }
//! ```

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::identity::MetadataError;
use crate::orchestrator::OrchestratorError;
use crate::source::{DuplicateSource, SourceError};

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plugin registration error
    #[error(transparent)]
    DuplicateSource(#[from] DuplicateSource),

    /// Source plugin error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Single-source operation error
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// Metadata service error
    #[error("Metadata service error: {0}")]
    Metadata(#[from] MetadataError),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, MetadataError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Metadata(e).context(ctx))
    }
}
