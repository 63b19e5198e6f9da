//! Adapter layer: Convert AniList DTOs to domain models
//!
//! This is the ONLY place where AniList DTO types are converted to domain
//! types, and where fuzzy title scoring against AniList results happens.

use super::dto;
use crate::identity::ExternalMatch;
use crate::merge::{Normalizer, similarity};
use crate::model::ExternalId;

/// Prefix for AniList ids, so ids from other providers can never collide.
pub const ID_PREFIX: &str = "anilist:";

/// Pick the media whose titles best match `query`.
///
/// Confidence is the best similarity between the normalized query and any
/// romaji, english, native or synonym title, scaled to 0.0-1.0. Ties keep
/// AniList's own relevance order.
///
/// Only titles carrying the same digit runs as the query are scored, so a
/// "Season 3" query never binds to the "Season 2" entry.
pub fn best_match(query: &str, media: &[dto::Media], normalizer: &Normalizer) -> Option<ExternalMatch> {
    let query_key = normalizer.normalize(query);
    let query_digits = query_key.digit_runs();

    let mut best: Option<(f64, &dto::Media)> = None;
    for entry in media {
        let score = all_titles(entry)
            .map(|title| normalizer.normalize(title))
            .filter(|key| key.digit_runs() == query_digits)
            .map(|key| similarity(&query_key, &key))
            .fold(0.0_f64, f64::max);
        if best.is_none_or(|(best_score, _)| score > best_score) {
            best = Some((score, entry));
        }
    }

    let (score, entry) = best?;
    Some(ExternalMatch {
        external_id: ExternalId::new(format!("{}{}", ID_PREFIX, entry.id)),
        confidence: (score / 100.0) as f32,
        matched_title: display_title(entry),
    })
}

fn all_titles(media: &dto::Media) -> impl Iterator<Item = &str> {
    let title = &media.title;
    [&title.romaji, &title.english, &title.native]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .chain(media.synonyms.iter().map(String::as_str))
}

/// English title if present, then romaji, then native, then the id.
fn display_title(media: &dto::Media) -> String {
    let title = &media.title;
    title
        .english
        .clone()
        .or_else(|| title.romaji.clone())
        .or_else(|| title.native.clone())
        .unwrap_or_else(|| format!("AniList #{}", media.id))
}
