//! AniList API integration
//!
//! Resolves anime titles to AniList media ids through the public GraphQL
//! endpoint. Used by the identity cache to key cached results by a stable id
//! instead of a site-specific spelling.
//!
//! API docs: https://docs.anilist.co

pub mod dto;
mod adapter;
mod client;

pub use adapter::best_match;
pub use client::{AniListClient, DEFAULT_ENDPOINT};
