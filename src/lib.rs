//! anisource - multi-source anime search and stream resolution.
//!
//! Queries any number of independently implemented source sites at once,
//! merges near-duplicate results into canonical records, and resolves an
//! episode to a playable stream by racing every source that lists it.
//! Expensive lookups are cached in a sharded SQLite store, keyed by an
//! AniList id whenever the title can be identified.
//!
//! Site-specific scraping lives outside this crate: embedders implement
//! [`source::Source`] (or [`source::BlockingSource`]) per site and register
//! the plugins with an [`EngineBuilder`].

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod merge;
pub mod model;
pub mod orchestrator;
pub mod resolver;
pub mod source;
#[cfg(test)]
pub mod test_utils;

pub use engine::{Engine, EngineBuilder};
pub use error::{Error, Result};
