//! Core data models shared by every subsystem.
//!
//! Defines the entities that flow between sources, the merge engine and the
//! resolver: [`Candidate`], [`CanonicalRecord`], [`EpisodeSet`] and
//! [`PlayableResource`].
//!
//! All of them are serializable because search results and episode lists
//! are persisted in the TTL cache. [`PlayableResource`] is serializable for
//! the playback collaborator only; it is never written to the cache.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, source-specific data attached to a candidate.
pub type ExtraParams = serde_json::Map<String, serde_json::Value>;

/// Identifier of a registered source plugin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Stable identifier assigned by the metadata service (e.g. an AniList id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One source's view of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Title as displayed by the source
    pub display_title: String,
    /// Source that produced this candidate
    pub source_id: SourceId,
    /// Address the source understands (usually a URL)
    pub locator: String,
    /// Source-specific data passed back on episode listing
    #[serde(default)]
    pub extra_params: ExtraParams,
}

impl Candidate {
    /// Create a candidate without extra parameters.
    pub fn new(
        source_id: impl Into<SourceId>,
        display_title: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            display_title: display_title.into(),
            source_id: source_id.into(),
            locator: locator.into(),
            extra_params: ExtraParams::new(),
        }
    }

    /// Attach one extra parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Rejected episode list: locators and labels disagree in length.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed episode data: {locators} locators but {labels} labels")]
pub struct MalformedEpisodeData {
    pub locators: usize,
    pub labels: usize,
}

/// Ordered episode locators with matching display labels.
///
/// Both lists always have the same length. Construction with mismatched
/// lengths fails instead of truncating, since truncation would shift
/// episode numbers against their labels. Deserialization goes through the
/// same check so a tampered cache entry cannot bypass it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEpisodeSet")]
pub struct EpisodeSet {
    locators: Vec<String>,
    labels: Vec<String>,
}

#[derive(Deserialize)]
struct RawEpisodeSet {
    locators: Vec<String>,
    labels: Vec<String>,
}

impl TryFrom<RawEpisodeSet> for EpisodeSet {
    type Error = MalformedEpisodeData;

    fn try_from(raw: RawEpisodeSet) -> Result<Self, Self::Error> {
        EpisodeSet::new(raw.locators, raw.labels)
    }
}

/// A single entry of an [`EpisodeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Episode<'a> {
    pub index: usize,
    pub locator: &'a str,
    pub label: &'a str,
}

impl EpisodeSet {
    /// Build an episode set, rejecting mismatched list lengths.
    pub fn new(locators: Vec<String>, labels: Vec<String>) -> Result<Self, MalformedEpisodeData> {
        if locators.len() != labels.len() {
            return Err(MalformedEpisodeData {
                locators: locators.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { locators, labels })
    }

    /// Build an episode set labelled "Episode 1", "Episode 2", ...
    pub fn numbered(locators: Vec<String>) -> Self {
        let labels = (1..=locators.len())
            .map(|n| format!("Episode {}", n))
            .collect();
        Self { locators, labels }
    }

    pub fn len(&self) -> usize {
        self.locators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    /// Episode at a zero-based index.
    pub fn get(&self, index: usize) -> Option<Episode<'_>> {
        Some(Episode {
            index,
            locator: self.locators.get(index)?,
            label: self.labels.get(index)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Episode<'_>> {
        self.locators
            .iter()
            .zip(&self.labels)
            .enumerate()
            .map(|(index, (locator, label))| Episode {
                index,
                locator,
                label,
            })
    }

    pub fn locators(&self) -> &[String] {
        &self.locators
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// The merged, user-facing entity spanning one or more sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Title of the first candidate that created this record
    pub canonical_title: String,
    /// Every candidate merged into this record, with source attribution
    pub candidates: Vec<Candidate>,
    /// Metadata-service id, once resolved
    #[serde(default)]
    pub external_id: Option<ExternalId>,
    /// Episode lists fetched so far, per source
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub episodes: BTreeMap<SourceId, EpisodeSet>,
}

impl CanonicalRecord {
    /// Create a record whose canonical title is the candidate's title.
    pub fn new(candidate: Candidate) -> Self {
        Self {
            canonical_title: candidate.display_title.clone(),
            candidates: vec![candidate],
            external_id: None,
            episodes: BTreeMap::new(),
        }
    }

    /// Append a candidate. The canonical title never changes.
    ///
    /// Returns `false` if the exact same (source, locator) pair was already
    /// present.
    pub fn absorb(&mut self, candidate: Candidate) -> bool {
        let duplicate = self
            .candidates
            .iter()
            .any(|c| c.source_id == candidate.source_id && c.locator == candidate.locator);
        if duplicate {
            return false;
        }
        self.candidates.push(candidate);
        true
    }

    /// First candidate contributed by a given source.
    pub fn candidate_for(&self, source_id: &SourceId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| &c.source_id == source_id)
    }

    /// Distinct sources contributing to this record, in first-seen order.
    pub fn sources(&self) -> Vec<SourceId> {
        let mut seen = Vec::new();
        for candidate in &self.candidates {
            if !seen.contains(&candidate.source_id) {
                seen.push(candidate.source_id.clone());
            }
        }
        seen
    }
}

/// A resolved, playable stream handed to the playback collaborator.
///
/// Locators frequently embed short-lived tokens, so this type is
/// request-scoped and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableResource {
    /// Direct media locator (m3u8, mp4, ...)
    pub locator: String,
    /// Transport headers required by the host (Referer, User-Agent, ...)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl PlayableResource {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
